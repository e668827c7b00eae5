//! Pipeline Classifiers - Asset categorization and labeling
//!
//! Classifiers produce categorical labels, used to group assets for
//! grouped cross-sectional operations or to build filters by label.

use crate::data::dataset::BoundColumn;
use crate::error::{PipelineError, Result};
use crate::pipeline::filters::Filter;
use crate::pipeline::term::{Expr, Leaf, Term, TermKind, UnaryOp};
use crate::types::Label;

/// Categorical pipeline term
#[derive(Debug, Clone)]
pub struct Classifier(Term);

impl Classifier {
    pub(crate) fn wrap(term: Term) -> Classifier {
        Classifier(term)
    }

    /// Latest label of a categorical column
    pub fn latest(column: &BoundColumn) -> Classifier {
        Classifier(Term::new(
            Expr::Leaf(Leaf::Column(column.clone())),
            TermKind::Classifier,
        ))
    }

    /// Reference to another pipeline output by name
    pub fn reference(name: impl Into<String>) -> Classifier {
        Classifier(Term::reference(name, TermKind::Classifier))
    }

    /// Wrap an untyped term, checking its kind
    pub fn from_term(term: Term) -> Result<Classifier> {
        if term.kind() != TermKind::Classifier {
            return Err(PipelineError::TypeMismatchError {
                term: term.name().to_string(),
                expected: TermKind::Classifier.to_string(),
                found: term.kind().to_string(),
            });
        }
        Ok(Classifier(term))
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

    /// True where the label equals `label`; missing labels stay missing
    pub fn eq(&self, label: impl Into<Label>) -> Filter {
        self.isin(vec![label.into()])
    }

    pub fn not_eq(&self, label: impl Into<Label>) -> Filter {
        self.eq(label).not()
    }

    /// True where the label is one of `labels`
    pub fn isin<L: Into<Label>>(&self, labels: impl IntoIterator<Item = L>) -> Filter {
        Filter::wrap(Term::label_match(
            &self.0,
            labels.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn is_missing(&self) -> Filter {
        Filter::wrap(Term::unary(UnaryOp::IsMissing, &self.0))
    }

    pub fn with_mask(&self, mask: &Filter) -> Classifier {
        Classifier(self.0.with_mask(mask.term()))
    }
}

impl From<Classifier> for Term {
    fn from(value: Classifier) -> Self {
        value.0
    }
}

impl From<&Classifier> for Term {
    fn from(value: &Classifier) -> Self {
        value.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Fundamentals;

    #[test]
    fn test_isin_canonical_labels() {
        let sector = Classifier::latest(&Fundamentals::categorical("sector"));
        let a = sector.isin(vec!["tech", "energy", "tech"]);
        let b = sector.isin(vec!["energy", "tech"]);
        assert_eq!(a.term(), b.term());
        assert_eq!(a.name(), "Fundamentals.sector.isin([energy, tech])");
    }

    #[test]
    fn test_eq_and_not_eq() {
        let sector = Classifier::latest(&Fundamentals::categorical("sector"));
        let tech = sector.eq("tech");
        let other = sector.not_eq("tech");
        assert_eq!(tech.term().kind(), TermKind::Filter);
        assert_eq!(other.name(), format!("not({})", tech.name()));
    }
}
