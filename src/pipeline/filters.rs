//! Pipeline Filters - Asset screening and filtering
//!
//! Filters produce three-valued boolean outputs and are used both as
//! screens and as masks restricting where other terms are computed.

use crate::error::{PipelineError, Result};
use crate::pipeline::factors::WindowTransform;
use crate::pipeline::term::{BinaryOp, Term, TermKind, UnaryOp};
use crate::types::AssetId;

/// Boolean pipeline term
#[derive(Debug, Clone)]
pub struct Filter(Term);

impl Filter {
    pub(crate) fn wrap(term: Term) -> Filter {
        Filter(term)
    }

    /// Wrap an untyped term, checking its kind
    pub fn from_term(term: Term) -> Result<Filter> {
        if term.kind() != TermKind::Filter {
            return Err(PipelineError::TypeMismatchError {
                term: term.name().to_string(),
                expected: TermKind::Filter.to_string(),
                found: term.kind().to_string(),
            });
        }
        Ok(Filter(term))
    }

    /// True for exactly the given assets
    pub fn static_assets(assets: impl IntoIterator<Item = AssetId>) -> Filter {
        Filter(Term::static_assets(assets))
    }

    /// True where every value of `input` over the trailing window is present.
    ///
    /// Missing until the asset has a full window of listed history.
    pub fn all_present(input: &Term, window_length: usize) -> Filter {
        Filter(Term::windowed(
            WindowTransform::AllPresent,
            vec![input.clone()],
            window_length,
        ))
    }

    /// Reference to another pipeline output by name
    pub fn reference(name: impl Into<String>) -> Filter {
        Filter(Term::reference(name, TermKind::Filter))
    }

    pub fn term(&self) -> &Term {
        &self.0
    }

    pub fn into_term(self) -> Term {
        self.0
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Kleene conjunction
    pub fn and(&self, other: &Filter) -> Filter {
        Filter(Term::binary(BinaryOp::And, &self.0, &other.0))
    }

    /// Kleene disjunction
    pub fn or(&self, other: &Filter) -> Filter {
        Filter(Term::binary(BinaryOp::Or, &self.0, &other.0))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Filter {
        Filter(Term::unary(UnaryOp::Not, &self.0))
    }

    /// Definitely-known check; a missing filter value becomes false
    pub fn not_missing(&self) -> Filter {
        Filter(Term::unary(UnaryOp::NotMissing, &self.0))
    }

    pub fn with_mask(&self, mask: &Filter) -> Filter {
        Filter(self.0.with_mask(&mask.0))
    }
}

impl From<Filter> for Term {
    fn from(value: Filter) -> Self {
        value.0
    }
}

impl From<&Filter> for Term {
    fn from(value: &Filter) -> Self {
        value.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::EquityPricing;
    use crate::pipeline::factors::Factor;
    use crate::pipeline::term::Expr;

    #[test]
    fn test_combinators_build_filters() {
        let close = Factor::latest(&EquityPricing::close());
        let cheap = close.lt(10.0);
        let liquid = Factor::latest(&EquityPricing::volume()).gt(1e6);

        let both = cheap.and(&liquid);
        assert_eq!(both.term().kind(), TermKind::Filter);
        assert_eq!(both.term(), liquid.and(&cheap).term());

        let neither = cheap.or(&liquid).not();
        assert!(matches!(
            neither.term().expr(),
            Expr::UnaryOp { op: UnaryOp::Not, .. }
        ));
    }

    #[test]
    fn test_static_assets_sorted() {
        let f = Filter::static_assets(vec![3, 1, 3]);
        assert_eq!(f.name(), "static_assets[1,3]");
    }

    #[test]
    fn test_from_term_rejects_factor() {
        let err = Filter::from_term(Term::constant(1.0)).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatchError { .. }));
    }
}
