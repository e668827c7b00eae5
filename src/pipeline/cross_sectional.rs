//! Cross-sectional operations
//!
//! These reduce across all assets of a single date rather than across time.
//! Inputs arrive as one row of values aligned with the run's asset order
//! (ascending asset id); `NaN` marks an asset outside the cross-section.

use crate::pipeline::term::TermKind;
use crate::pipeline::value::Tri;
use crate::types::Label;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Per-date reduction across assets
#[derive(Debug, Clone, PartialEq)]
pub enum CrossSectionalOp {
    /// Ordinal rank from 1, ties broken by asset order
    Rank { ascending: bool },
    ZScore,
    Demean,
    /// The `n` largest values
    Top(usize),
    /// The `n` smallest values
    Bottom(usize),
    /// Values between two percentiles, both in `[0, 100]`
    PercentileBetween { min: f64, max: f64 },
    /// Bucket labels `0..bins` by ascending value
    Quantiles(usize),
}

impl CrossSectionalOp {
    pub fn name(&self) -> String {
        match self {
            CrossSectionalOp::Rank { ascending: true } => "rank".to_string(),
            CrossSectionalOp::Rank { ascending: false } => "rank_desc".to_string(),
            CrossSectionalOp::ZScore => "zscore".to_string(),
            CrossSectionalOp::Demean => "demean".to_string(),
            CrossSectionalOp::Top(n) => format!("top[{}]", n),
            CrossSectionalOp::Bottom(n) => format!("bottom[{}]", n),
            CrossSectionalOp::PercentileBetween { min, max } => {
                format!("percentile_between[{}, {}]", min, max)
            }
            CrossSectionalOp::Quantiles(bins) => format!("quantiles[{}]", bins),
        }
    }

    pub fn output_kind(&self) -> TermKind {
        match self {
            CrossSectionalOp::Rank { .. } | CrossSectionalOp::ZScore | CrossSectionalOp::Demean => {
                TermKind::Factor
            }
            CrossSectionalOp::Top(_)
            | CrossSectionalOp::Bottom(_)
            | CrossSectionalOp::PercentileBetween { .. } => TermKind::Filter,
            CrossSectionalOp::Quantiles(_) => TermKind::Classifier,
        }
    }

    /// Check the operation's parameters
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            CrossSectionalOp::Top(0) | CrossSectionalOp::Bottom(0) => {
                Err("n must be at least 1".to_string())
            }
            CrossSectionalOp::PercentileBetween { min, max } => {
                if !(0.0..=100.0).contains(min) || !(0.0..=100.0).contains(max) {
                    Err("percentiles must be between 0 and 100".to_string())
                } else if min > max {
                    Err("min percentile must not exceed max percentile".to_string())
                } else {
                    Ok(())
                }
            }
            CrossSectionalOp::Quantiles(bins) if *bins < 2 => {
                Err("bins must be at least 2".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Output row of a cross-sectional operation
#[derive(Debug, Clone, PartialEq)]
pub enum SectionOutput {
    Numbers(Vec<f64>),
    Flags(Vec<Tri>),
    Labels(Vec<Option<Label>>),
}

/// Apply `op` to one date's row.
///
/// `groups`, when given, partitions the row; assets without a group label are
/// left out like missing values.
pub fn compute(op: &CrossSectionalOp, row: &[f64], groups: Option<&[Option<Label>]>) -> SectionOutput {
    let mut output = match op.output_kind() {
        TermKind::Factor => SectionOutput::Numbers(vec![f64::NAN; row.len()]),
        TermKind::Filter => SectionOutput::Flags(vec![Tri::Missing; row.len()]),
        TermKind::Classifier => SectionOutput::Labels(vec![None; row.len()]),
    };

    for members in partition(row, groups) {
        compute_group(op, row, &members, &mut output);
    }
    output
}

fn partition(row: &[f64], groups: Option<&[Option<Label>]>) -> Vec<Vec<usize>> {
    match groups {
        None => vec![(0..row.len()).filter(|&i| !row[i].is_nan()).collect()],
        Some(labels) => {
            let mut by_label: BTreeMap<&Label, Vec<usize>> = BTreeMap::new();
            for (i, value) in row.iter().enumerate() {
                if value.is_nan() {
                    continue;
                }
                if let Some(Some(label)) = labels.get(i) {
                    by_label.entry(label).or_default().push(i);
                }
            }
            by_label.into_values().collect()
        }
    }
}

/// Member indices sorted by value, ties kept in asset order
fn sorted_members(row: &[f64], members: &[usize], ascending: bool) -> Vec<usize> {
    let mut sorted = members.to_vec();
    sorted.sort_by(|&a, &b| {
        let ord = row[a].total_cmp(&row[b]);
        if ascending {
            ord
        } else {
            ord.reverse()
        }
    });
    sorted
}

fn compute_group(op: &CrossSectionalOp, row: &[f64], members: &[usize], output: &mut SectionOutput) {
    if members.is_empty() {
        return;
    }

    match (op, output) {
        (CrossSectionalOp::Rank { ascending }, SectionOutput::Numbers(out)) => {
            for (position, &i) in sorted_members(row, members, *ascending).iter().enumerate() {
                out[i] = (position + 1) as f64;
            }
        }
        (CrossSectionalOp::ZScore, SectionOutput::Numbers(out)) => {
            let values: Vec<f64> = members.iter().map(|&i| row[i]).collect();
            let mean = values.iter().mean();
            let std = values.iter().population_std_dev();
            for &i in members {
                let z = (row[i] - mean) / std;
                out[i] = if z.is_finite() { z } else { f64::NAN };
            }
        }
        (CrossSectionalOp::Demean, SectionOutput::Numbers(out)) => {
            let mean = members.iter().map(|&i| row[i]).mean();
            for &i in members {
                out[i] = row[i] - mean;
            }
        }
        (CrossSectionalOp::Top(n), SectionOutput::Flags(out)) => {
            for (position, &i) in sorted_members(row, members, false).iter().enumerate() {
                out[i] = Tri::from(position < *n);
            }
        }
        (CrossSectionalOp::Bottom(n), SectionOutput::Flags(out)) => {
            for (position, &i) in sorted_members(row, members, true).iter().enumerate() {
                out[i] = Tri::from(position < *n);
            }
        }
        (CrossSectionalOp::PercentileBetween { min, max }, SectionOutput::Flags(out)) => {
            let mut values: Vec<f64> = members.iter().map(|&i| row[i]).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            let low = percentile(&values, *min);
            let high = percentile(&values, *max);
            for &i in members {
                out[i] = Tri::from(row[i] >= low && row[i] <= high);
            }
        }
        (CrossSectionalOp::Quantiles(bins), SectionOutput::Labels(out)) => {
            let len = members.len();
            for (position, &i) in sorted_members(row, members, true).iter().enumerate() {
                let bucket = position * bins / len;
                out[i] = Some(Label::Int(bucket as i64));
            }
        }
        _ => {}
    }
}

/// Linear-interpolated percentile of sorted, non-empty values
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn numbers(output: SectionOutput) -> Vec<f64> {
        match output {
            SectionOutput::Numbers(v) => v,
            other => panic!("expected numbers, got {:?}", other),
        }
    }

    fn flags(output: SectionOutput) -> Vec<Tri> {
        match output {
            SectionOutput::Flags(v) => v,
            other => panic!("expected flags, got {:?}", other),
        }
    }

    #[test]
    fn test_rank_ties_by_asset_order() {
        let row = [3.0, 1.0, 3.0, f64::NAN, 2.0];
        let ranks = numbers(compute(&CrossSectionalOp::Rank { ascending: true }, &row, None));
        assert_eq!(ranks[0], 3.0);
        assert_eq!(ranks[1], 1.0);
        assert_eq!(ranks[2], 4.0);
        assert!(ranks[3].is_nan());
        assert_eq!(ranks[4], 2.0);

        let desc = numbers(compute(&CrossSectionalOp::Rank { ascending: false }, &row, None));
        assert_eq!(desc[0], 1.0);
        assert_eq!(desc[2], 2.0);
        assert_eq!(desc[1], 4.0);
    }

    #[test]
    fn test_zscore_and_demean() {
        let row = [1.0, 2.0, 3.0];
        let z = numbers(compute(&CrossSectionalOp::ZScore, &row, None));
        let std = (2.0_f64 / 3.0).sqrt();
        assert_abs_diff_eq!(z[0], -1.0 / std, epsilon = 1e-12);
        assert_abs_diff_eq!(z[1], 0.0, epsilon = 1e-12);

        let d = numbers(compute(&CrossSectionalOp::Demean, &row, None));
        assert_eq!(d, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_zscore_constant_row_is_missing() {
        let z = numbers(compute(&CrossSectionalOp::ZScore, &[5.0, 5.0], None));
        assert!(z.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_grouped_demean() {
        let row = [1.0, 10.0, 3.0, 20.0, 7.0];
        let groups = vec![
            Some(Label::from("a")),
            Some(Label::from("b")),
            Some(Label::from("a")),
            Some(Label::from("b")),
            None,
        ];
        let d = numbers(compute(&CrossSectionalOp::Demean, &row, Some(&groups)));
        assert_eq!(&d[..4], &[-1.0, -5.0, 1.0, 5.0]);
        assert!(d[4].is_nan());
    }

    #[test]
    fn test_top_and_bottom() {
        let row = [4.0, f64::NAN, 9.0, 1.0];
        let top = flags(compute(&CrossSectionalOp::Top(2), &row, None));
        assert_eq!(top, vec![Tri::True, Tri::Missing, Tri::True, Tri::False]);

        let bottom = flags(compute(&CrossSectionalOp::Bottom(1), &row, None));
        assert_eq!(bottom, vec![Tri::False, Tri::Missing, Tri::False, Tri::True]);
    }

    #[test]
    fn test_percentile_between() {
        let row = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mid = flags(compute(
            &CrossSectionalOp::PercentileBetween { min: 25.0, max: 75.0 },
            &row,
            None,
        ));
        assert_eq!(
            mid,
            vec![Tri::False, Tri::True, Tri::True, Tri::True, Tri::False]
        );
    }

    #[test]
    fn test_quantiles() {
        let row = [40.0, 10.0, 30.0, 20.0];
        match compute(&CrossSectionalOp::Quantiles(2), &row, None) {
            SectionOutput::Labels(labels) => assert_eq!(
                labels,
                vec![
                    Some(Label::Int(1)),
                    Some(Label::Int(0)),
                    Some(Label::Int(1)),
                    Some(Label::Int(0)),
                ]
            ),
            other => panic!("expected labels, got {:?}", other),
        }
    }

    #[test]
    fn test_validate() {
        assert!(CrossSectionalOp::Quantiles(1).validate().is_err());
        assert!(CrossSectionalOp::Top(0).validate().is_err());
        assert!(CrossSectionalOp::PercentileBetween { min: 80.0, max: 20.0 }
            .validate()
            .is_err());
        assert!(CrossSectionalOp::PercentileBetween { min: 0.0, max: 100.0 }
            .validate()
            .is_ok());
    }
}
