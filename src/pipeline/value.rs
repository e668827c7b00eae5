//! Per-asset values produced by pipeline terms

use crate::types::Label;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Three-valued boolean produced by filters.
///
/// Logic follows Kleene: `Missing` only resolves when the other operand decides
/// the result on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tri {
    True,
    False,
    Missing,
}

impl Tri {
    pub fn and(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::False, _) | (_, Tri::False) => Tri::False,
            (Tri::True, Tri::True) => Tri::True,
            _ => Tri::Missing,
        }
    }

    pub fn or(self, other: Tri) -> Tri {
        match (self, other) {
            (Tri::True, _) | (_, Tri::True) => Tri::True,
            (Tri::False, Tri::False) => Tri::False,
            _ => Tri::Missing,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Tri {
        match self {
            Tri::True => Tri::False,
            Tri::False => Tri::True,
            Tri::Missing => Tri::Missing,
        }
    }

    pub fn is_true(self) -> bool {
        self == Tri::True
    }

    pub fn is_missing(self) -> bool {
        self == Tri::Missing
    }

    pub fn to_option(self) -> Option<bool> {
        match self {
            Tri::True => Some(true),
            Tri::False => Some(false),
            Tri::Missing => None,
        }
    }
}

impl From<bool> for Tri {
    fn from(value: bool) -> Self {
        if value {
            Tri::True
        } else {
            Tri::False
        }
    }
}

/// One cell of a result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Label(Label),
    Missing,
}

impl Value {
    /// Numeric cell, `Missing` for non-finite input
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Value::Number(value)
        } else {
            Value::Missing
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_label(&self) -> Option<&Label> {
        match self {
            Value::Label(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Tri> for Value {
    fn from(value: Tri) -> Self {
        match value.to_option() {
            Some(b) => Value::Bool(b),
            None => Value::Missing,
        }
    }
}

impl From<Option<Label>> for Value {
    fn from(value: Option<Label>) -> Self {
        value.map_or(Value::Missing, Value::Label)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Label(l) => write!(f, "{}", l),
            Value::Missing => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Tri; 3] = [Tri::True, Tri::False, Tri::Missing];

    #[test]
    fn test_kleene_and() {
        assert_eq!(Tri::True.and(Tri::Missing), Tri::Missing);
        assert_eq!(Tri::False.and(Tri::Missing), Tri::False);
        assert_eq!(Tri::True.and(Tri::True), Tri::True);
    }

    #[test]
    fn test_kleene_or() {
        assert_eq!(Tri::True.or(Tri::Missing), Tri::True);
        assert_eq!(Tri::False.or(Tri::Missing), Tri::Missing);
        assert_eq!(Tri::False.or(Tri::False), Tri::False);
    }

    #[test]
    fn test_not_keeps_missing() {
        assert_eq!(Tri::Missing.not(), Tri::Missing);
        assert_eq!(Tri::True.not(), Tri::False);
    }

    #[test]
    fn test_and_or_commutative_and_associative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.and(b), b.and(a));
                assert_eq!(a.or(b), b.or(a));
                for c in ALL {
                    assert_eq!(a.and(b).and(c), a.and(b.and(c)));
                    assert_eq!(a.or(b).or(c), a.or(b.or(c)));
                }
            }
        }
    }

    #[test]
    fn test_value_number_rejects_non_finite() {
        assert_eq!(Value::number(1.5), Value::Number(1.5));
        assert!(Value::number(f64::NAN).is_missing());
        assert!(Value::number(f64::INFINITY).is_missing());
        assert_eq!(Value::from(Tri::Missing), Value::Missing);
    }

    #[test]
    fn test_value_json() {
        let cells = vec![
            Value::Number(2.5),
            Value::Bool(true),
            Value::Label(Label::from("tech")),
            Value::Missing,
        ];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"[2.5,true,"tech",null]"#);
    }
}
