//! Tests for pipeline error types
//!
//! Covers message formatting, structural classification and conversion from
//! the underlying library errors.

use chrono::NaiveDate;
use rusty_pipeline::error::PipelineError;
use rusty_pipeline::prelude::*;

#[cfg(test)]
mod pipeline_error_tests {
    use super::*;

    // ========== Structural errors ==========

    #[test]
    fn test_cycle_error() {
        let err = PipelineError::CycleError {
            path: vec![
                "(1 + b<Factor>)".to_string(),
                "b<Factor>".to_string(),
                "(1 + b<Factor>)".to_string(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Cycle detected in term graph"));
        assert!(msg.contains("b<Factor> -> (1 + b<Factor>)"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_type_mismatch_error() {
        let err = PipelineError::TypeMismatchError {
            term: "(Fundamentals.sector > 5) (left operand)".to_string(),
            expected: "Factor".to_string(),
            found: "Classifier".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Fundamentals.sector"));
        assert!(msg.contains("expected Factor"));
        assert!(msg.contains("found Classifier"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_and_invalid_terms() {
        assert_eq!(
            PipelineError::UnknownTerm("momentum".to_string()).to_string(),
            "Unknown term: momentum"
        );
        let invalid = PipelineError::InvalidTerm("bins must be at least 2".to_string());
        assert!(invalid.to_string().contains("bins"));
        assert!(invalid.is_structural());
    }

    // ========== Run errors ==========

    #[test]
    fn test_data_unavailable_error() {
        let err = PipelineError::DataUnavailableError {
            column: "EquityPricing.close".to_string(),
            reason: "column is not registered with this loader".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Data unavailable for column EquityPricing.close: column is not registered with this loader"
        );
        assert!(!err.is_structural());
    }

    #[test]
    fn test_invalid_date_range() {
        let err = PipelineError::InvalidDateRange {
            start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        };
        assert!(err.to_string().contains("2024-03-01"));
        assert!(err.to_string().contains("2024-02-01"));
    }

    // ========== Conversions ==========

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "close.csv");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::IoError(_)));
        assert!(err.to_string().contains("close.csv"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let err = EngineConfig::from_toml_str("parallel = \"sometimes\"").unwrap_err();
        assert!(matches!(err, PipelineError::TomlError(_)));
    }

    #[test]
    fn test_csv_error_from_missing_file() {
        let mut loader = CsvLoader::new();
        let err = loader
            .add_file(&EquityPricing::close(), "/nonexistent/close.csv")
            .unwrap_err();
        assert!(matches!(err, PipelineError::CsvError(_)));
    }

    #[test]
    fn test_result_alias() {
        fn parse(s: &str) -> Result<SessionDate> {
            parse_iso_date(s)
        }
        assert!(parse("2024-01-02").is_ok());
        assert!(matches!(parse("nope"), Err(PipelineError::ParseError(_))));
    }
}
