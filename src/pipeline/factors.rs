//! Factors - numeric pipeline terms and windowed transforms

use crate::data::dataset::BoundColumn;
use crate::error::{PipelineError, Result};
use crate::pipeline::classifiers::Classifier;
use crate::pipeline::cross_sectional::CrossSectionalOp;
use crate::pipeline::filters::Filter;
use crate::pipeline::term::{BinaryOp, CompareOp, Expr, Leaf, Term, TermKind, UnaryOp};
use crate::types::TRADING_DAYS_PER_YEAR;
use statrs::statistics::Statistics;
use std::fmt;
use std::sync::Arc;

/// User reduction over the input windows (one slice per input, oldest first)
pub type WindowFn = dyn Fn(&[&[f64]]) -> f64 + Send + Sync;

/// Named user-supplied window reduction.
///
/// The name is part of the term identity, so distinct functions need distinct names.
#[derive(Clone)]
pub struct CustomWindowFn {
    name: String,
    func: Arc<WindowFn>,
}

impl CustomWindowFn {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[&[f64]]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomWindowFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomWindowFn({})", self.name)
    }
}

/// Per-asset reduction over a trailing window
#[derive(Debug, Clone)]
pub enum WindowTransform {
    /// Simple moving average
    Mean,
    /// Exponentially weighted mean; the newest observation has weight 1
    ExponentialWeightedMean { decay_rate: f64 },
    /// `last / first - 1`
    Returns,
    /// Population standard deviation
    StdDev,
    /// Population standard deviation scaled by `sqrt(annualization)`
    AnnualizedVolatility { annualization: f64 },
    /// Mean of close * volume (inputs: close, volume)
    AverageDollarVolume,
    /// Volume weighted average price (inputs: close, volume)
    Vwap,
    /// Largest peak-to-trough decline as a fraction of the peak
    MaxDrawdown,
    Max,
    Min,
    Sum,
    /// Filter: every value in the window is present
    AllPresent,
    Custom(CustomWindowFn),
}

impl WindowTransform {
    pub fn name(&self) -> String {
        match self {
            WindowTransform::Mean => "sma".to_string(),
            WindowTransform::ExponentialWeightedMean { decay_rate } => {
                format!("ewma[decay={}]", decay_rate)
            }
            WindowTransform::Returns => "returns".to_string(),
            WindowTransform::StdDev => "stddev".to_string(),
            WindowTransform::AnnualizedVolatility { annualization } => {
                format!("annualized_volatility[{}]", annualization)
            }
            WindowTransform::AverageDollarVolume => "average_dollar_volume".to_string(),
            WindowTransform::Vwap => "vwap".to_string(),
            WindowTransform::MaxDrawdown => "max_drawdown".to_string(),
            WindowTransform::Max => "window_max".to_string(),
            WindowTransform::Min => "window_min".to_string(),
            WindowTransform::Sum => "window_sum".to_string(),
            WindowTransform::AllPresent => "all_present".to_string(),
            WindowTransform::Custom(custom) => format!("custom:{}", custom.name()),
        }
    }

    /// Required number of inputs, `None` for any
    pub fn arity(&self) -> Option<usize> {
        match self {
            WindowTransform::AverageDollarVolume | WindowTransform::Vwap => Some(2),
            WindowTransform::Custom(_) => None,
            _ => Some(1),
        }
    }

    pub fn output_kind(&self) -> TermKind {
        match self {
            WindowTransform::AllPresent => TermKind::Filter,
            _ => TermKind::Factor,
        }
    }

    pub fn accepts_any_kind(&self) -> bool {
        matches!(self, WindowTransform::AllPresent)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            WindowTransform::ExponentialWeightedMean { decay_rate }
                if !(*decay_rate > 0.0 && *decay_rate <= 1.0) =>
            {
                Err(format!("decay rate must be in (0, 1], got {}", decay_rate))
            }
            WindowTransform::AnnualizedVolatility { annualization }
                if !(annualization.is_finite() && *annualization > 0.0) =>
            {
                Err(format!("annualization must be positive, got {}", annualization))
            }
            _ => Ok(()),
        }
    }

    /// Reduce complete windows (no missing values) to one value.
    ///
    /// `AllPresent` is not a numeric reduction and yields `NaN` here.
    pub fn reduce(&self, windows: &[&[f64]]) -> f64 {
        let first = windows[0];
        match self {
            WindowTransform::Mean => first.iter().mean(),
            WindowTransform::ExponentialWeightedMean { decay_rate } => {
                let n = first.len();
                let mut weighted = 0.0;
                let mut total_weight = 0.0;
                for (i, value) in first.iter().enumerate() {
                    let weight = decay_rate.powi((n - 1 - i) as i32);
                    weighted += weight * value;
                    total_weight += weight;
                }
                weighted / total_weight
            }
            WindowTransform::Returns => {
                let start = first[0];
                let end = first[first.len() - 1];
                (end - start) / start
            }
            WindowTransform::StdDev => first.iter().population_std_dev(),
            WindowTransform::AnnualizedVolatility { annualization } => {
                first.iter().population_std_dev() * annualization.sqrt()
            }
            WindowTransform::AverageDollarVolume => {
                let volume = windows[1];
                let total: f64 = first.iter().zip(volume).map(|(c, v)| c * v).sum();
                total / first.len() as f64
            }
            WindowTransform::Vwap => {
                let volume = windows[1];
                let dollars: f64 = first.iter().zip(volume).map(|(c, v)| c * v).sum();
                let shares: f64 = volume.iter().sum();
                dollars / shares
            }
            WindowTransform::MaxDrawdown => {
                let mut peak = f64::NEG_INFINITY;
                let mut worst = 0.0_f64;
                for value in first {
                    peak = peak.max(*value);
                    worst = worst.max((peak - value) / peak);
                }
                worst
            }
            WindowTransform::Max => first.iter().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v)),
            WindowTransform::Min => first.iter().fold(f64::INFINITY, |acc, v| acc.min(*v)),
            WindowTransform::Sum => first.iter().sum(),
            WindowTransform::AllPresent => f64::NAN,
            WindowTransform::Custom(custom) => (custom.func)(windows),
        }
    }
}

/// Numeric pipeline term
#[derive(Debug, Clone)]
pub struct Factor(Term);

impl Factor {
    /// Latest value of a numeric column
    pub fn latest(column: &BoundColumn) -> Factor {
        Factor(Term::new(
            Expr::Leaf(Leaf::Column(column.clone())),
            TermKind::Factor,
        ))
    }

    pub fn constant(value: f64) -> Factor {
        Factor(Term::constant(value))
    }

    /// Reference to another pipeline output by name
    pub fn reference(name: impl Into<String>) -> Factor {
        Factor(Term::reference(name, TermKind::Factor))
    }

    /// Wrap an untyped term, checking its kind
    pub fn from_term(term: Term) -> Result<Factor> {
        if term.kind() != TermKind::Factor {
            return Err(PipelineError::TypeMismatchError {
                term: term.name().to_string(),
                expected: TermKind::Factor.to_string(),
                found: term.kind().to_string(),
            });
        }
        Ok(Factor(term))
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

    pub fn with_mask(&self, mask: &Filter) -> Factor {
        Factor(self.0.with_mask(mask.term()))
    }

    fn binary(&self, op: BinaryOp, other: impl Into<Factor>) -> Factor {
        Factor(Term::binary(op, &self.0, other.into().term()))
    }

    fn unary(&self, op: UnaryOp) -> Factor {
        Factor(Term::unary(op, &self.0))
    }

    fn compare(&self, op: CompareOp, other: impl Into<Factor>) -> Filter {
        Filter::wrap(Term::compare(op, &self.0, other.into().term()))
    }

    fn window(&self, transform: WindowTransform, window_length: usize) -> Factor {
        Factor(Term::windowed(transform, vec![self.0.clone()], window_length))
    }

    fn section(&self, op: CrossSectionalOp, groupby: Option<&Classifier>) -> Term {
        Term::cross_sectional(op, &self.0, groupby.map(|g| g.term()))
    }

    // Arithmetic

    pub fn add(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Subtract, other)
    }

    pub fn mul(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Multiply, other)
    }

    /// Division; a zero or missing denominator yields missing
    pub fn div(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Divide, other)
    }

    pub fn pow(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Power, other)
    }

    pub fn min_with(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Min, other)
    }

    pub fn max_with(&self, other: impl Into<Factor>) -> Factor {
        self.binary(BinaryOp::Max, other)
    }

    pub fn neg(&self) -> Factor {
        self.unary(UnaryOp::Negate)
    }

    pub fn abs(&self) -> Factor {
        self.unary(UnaryOp::Abs)
    }

    pub fn log(&self) -> Factor {
        self.unary(UnaryOp::Log)
    }

    pub fn exp(&self) -> Factor {
        self.unary(UnaryOp::Exp)
    }

    pub fn sqrt(&self) -> Factor {
        self.unary(UnaryOp::Sqrt)
    }

    /// `(self - other) / other`
    pub fn percent_difference(&self, other: impl Into<Factor>) -> Factor {
        let other = other.into();
        self.sub(&other).div(&other)
    }

    // Comparisons

    pub fn gt(&self, other: impl Into<Factor>) -> Filter {
        self.compare(CompareOp::Greater, other)
    }

    pub fn ge(&self, other: impl Into<Factor>) -> Filter {
        self.compare(CompareOp::GreaterEqual, other)
    }

    pub fn lt(&self, other: impl Into<Factor>) -> Filter {
        self.compare(CompareOp::Less, other)
    }

    pub fn le(&self, other: impl Into<Factor>) -> Filter {
        self.compare(CompareOp::LessEqual, other)
    }

    pub fn eq(&self, other: impl Into<Factor>) -> Filter {
        self.compare(CompareOp::Equal, other)
    }

    pub fn ne(&self, other: impl Into<Factor>) -> Filter {
        self.compare(CompareOp::NotEqual, other)
    }

    pub fn is_missing(&self) -> Filter {
        Filter::wrap(Term::unary(UnaryOp::IsMissing, &self.0))
    }

    pub fn not_missing(&self) -> Filter {
        Filter::wrap(Term::unary(UnaryOp::NotMissing, &self.0))
    }

    // Windowed transforms

    pub fn sma(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::Mean, window_length)
    }

    /// Exponentially weighted mean with an explicit decay rate
    pub fn ewma(&self, decay_rate: f64, window_length: usize) -> Factor {
        self.window(
            WindowTransform::ExponentialWeightedMean { decay_rate },
            window_length,
        )
    }

    /// Exponentially weighted mean with `decay = 1 - 2 / (span + 1)`.
    ///
    /// `span` must exceed 1; smaller spans give a decay outside `(0, 1]` and
    /// fail to compile with `InvalidTerm`.
    pub fn ewma_span(&self, span: f64, window_length: usize) -> Factor {
        self.ewma(1.0 - 2.0 / (span + 1.0), window_length)
    }

    pub fn returns(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::Returns, window_length)
    }

    pub fn daily_returns(&self) -> Factor {
        self.returns(2)
    }

    pub fn std_dev(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::StdDev, window_length)
    }

    pub fn annualized_volatility(&self, window_length: usize) -> Factor {
        self.window(
            WindowTransform::AnnualizedVolatility {
                annualization: TRADING_DAYS_PER_YEAR,
            },
            window_length,
        )
    }

    pub fn max_drawdown(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::MaxDrawdown, window_length)
    }

    pub fn window_max(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::Max, window_length)
    }

    pub fn window_min(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::Min, window_length)
    }

    pub fn window_sum(&self, window_length: usize) -> Factor {
        self.window(WindowTransform::Sum, window_length)
    }

    pub fn average_dollar_volume(close: &Factor, volume: &Factor, window_length: usize) -> Factor {
        Factor(Term::windowed(
            WindowTransform::AverageDollarVolume,
            vec![close.0.clone(), volume.0.clone()],
            window_length,
        ))
    }

    pub fn vwap(close: &Factor, volume: &Factor, window_length: usize) -> Factor {
        Factor(Term::windowed(
            WindowTransform::Vwap,
            vec![close.0.clone(), volume.0.clone()],
            window_length,
        ))
    }

    /// User-defined reduction over the windows of `inputs`
    pub fn custom(
        name: impl Into<String>,
        inputs: &[Factor],
        window_length: usize,
        func: impl Fn(&[&[f64]]) -> f64 + Send + Sync + 'static,
    ) -> Factor {
        Factor(Term::windowed(
            WindowTransform::Custom(CustomWindowFn::new(name, func)),
            inputs.iter().map(|f| f.0.clone()).collect(),
            window_length,
        ))
    }

    // Cross-sectional methods

    /// Ordinal rank from 1, ties broken by ascending asset id
    pub fn rank(&self, ascending: bool) -> Factor {
        Factor(self.section(CrossSectionalOp::Rank { ascending }, None))
    }

    pub fn rank_grouped(&self, ascending: bool, groupby: &Classifier) -> Factor {
        Factor(self.section(CrossSectionalOp::Rank { ascending }, Some(groupby)))
    }

    pub fn zscore(&self) -> Factor {
        Factor(self.section(CrossSectionalOp::ZScore, None))
    }

    pub fn zscore_grouped(&self, groupby: &Classifier) -> Factor {
        Factor(self.section(CrossSectionalOp::ZScore, Some(groupby)))
    }

    pub fn demean(&self) -> Factor {
        Factor(self.section(CrossSectionalOp::Demean, None))
    }

    pub fn demean_grouped(&self, groupby: &Classifier) -> Factor {
        Factor(self.section(CrossSectionalOp::Demean, Some(groupby)))
    }

    /// True for the `n` largest values on each date
    pub fn top(&self, n: usize) -> Filter {
        Filter::wrap(self.section(CrossSectionalOp::Top(n), None))
    }

    pub fn top_grouped(&self, n: usize, groupby: &Classifier) -> Filter {
        Filter::wrap(self.section(CrossSectionalOp::Top(n), Some(groupby)))
    }

    /// True for the `n` smallest values on each date
    pub fn bottom(&self, n: usize) -> Filter {
        Filter::wrap(self.section(CrossSectionalOp::Bottom(n), None))
    }

    /// True for values between the `min` and `max` percentiles (0-100, inclusive)
    pub fn percentile_between(&self, min: f64, max: f64) -> Filter {
        Filter::wrap(self.section(CrossSectionalOp::PercentileBetween { min, max }, None))
    }

    /// Bucket labels `0..bins` by ascending value
    pub fn quantiles(&self, bins: usize) -> Classifier {
        Classifier::wrap(self.section(CrossSectionalOp::Quantiles(bins), None))
    }

    pub fn quartiles(&self) -> Classifier {
        self.quantiles(4)
    }

    pub fn quintiles(&self) -> Classifier {
        self.quantiles(5)
    }

    pub fn deciles(&self) -> Classifier {
        self.quantiles(10)
    }
}

impl From<f64> for Factor {
    fn from(value: f64) -> Self {
        Factor::constant(value)
    }
}

impl From<&Factor> for Factor {
    fn from(value: &Factor) -> Self {
        value.clone()
    }
}

impl From<Factor> for Term {
    fn from(value: Factor) -> Self {
        value.0
    }
}

impl From<&Factor> for Term {
    fn from(value: &Factor) -> Self {
        value.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::EquityPricing;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mean_and_sum() {
        let w = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(WindowTransform::Mean.reduce(&[&w]), 2.5);
        assert_abs_diff_eq!(WindowTransform::Sum.reduce(&[&w]), 10.0);
        assert_abs_diff_eq!(WindowTransform::Max.reduce(&[&w]), 4.0);
        assert_abs_diff_eq!(WindowTransform::Min.reduce(&[&w]), 1.0);
    }

    #[test]
    fn test_ewma_weights_newest_most() {
        let w = [1.0, 2.0];
        let ewma = WindowTransform::ExponentialWeightedMean { decay_rate: 0.5 }.reduce(&[&w]);
        // weights 0.5 and 1.0
        assert_abs_diff_eq!(ewma, (0.5 * 1.0 + 2.0) / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_returns() {
        let w = [100.0, 105.0, 110.0];
        assert_abs_diff_eq!(WindowTransform::Returns.reduce(&[&w]), 0.1, epsilon = 1e-12);

        let zero_start = [0.0, 1.0];
        assert!(!WindowTransform::Returns.reduce(&[&zero_start]).is_finite());
    }

    #[test]
    fn test_std_dev_is_population() {
        let w = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(WindowTransform::StdDev.reduce(&[&w]), 2.0, epsilon = 1e-12);

        let vol = WindowTransform::AnnualizedVolatility { annualization: 4.0 }.reduce(&[&w]);
        assert_abs_diff_eq!(vol, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dollar_volume_and_vwap() {
        let close = [10.0, 20.0];
        let volume = [100.0, 300.0];
        assert_abs_diff_eq!(
            WindowTransform::AverageDollarVolume.reduce(&[&close, &volume]),
            (1000.0 + 6000.0) / 2.0
        );
        assert_abs_diff_eq!(
            WindowTransform::Vwap.reduce(&[&close, &volume]),
            7000.0 / 400.0
        );
    }

    #[test]
    fn test_max_drawdown() {
        let w = [100.0, 120.0, 90.0, 110.0, 60.0];
        assert_abs_diff_eq!(
            WindowTransform::MaxDrawdown.reduce(&[&w]),
            0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_custom_reduction() {
        let spread = CustomWindowFn::new("spread", |w: &[&[f64]]| w[0][w[0].len() - 1] - w[1][0]);
        let a = [1.0, 5.0];
        let b = [2.0, 3.0];
        assert_abs_diff_eq!(WindowTransform::Custom(spread).reduce(&[&a, &b]), 3.0);
    }

    #[test]
    fn test_factor_builders() {
        let close = Factor::latest(&EquityPricing::close());
        let sma = close.sma(30);
        assert_eq!(sma.term().window_length(), 30);
        assert_eq!(sma.name(), "sma(EquityPricing.close, window=30)");

        let pct = close.percent_difference(&sma);
        assert!(matches!(pct.term().expr(), Expr::BinaryOp { op: BinaryOp::Divide, .. }));

        let screen = pct.gt(0.0);
        assert_eq!(screen.term().kind(), TermKind::Filter);

        let buckets = close.quintiles();
        assert_eq!(buckets.term().kind(), TermKind::Classifier);
    }

    #[test]
    fn test_from_term_checks_kind() {
        let filter = Factor::latest(&EquityPricing::close()).gt(1.0);
        assert!(Factor::from_term(filter.into_term()).is_err());
    }

    #[test]
    fn test_ewma_decay_bounds() {
        let close = Factor::latest(&EquityPricing::close());
        for bad in [close.ewma(0.0, 10), close.ewma(1.5, 10), close.ewma(f64::NAN, 10)] {
            let err = crate::pipeline::graph::compile(&[("x".to_string(), bad.into_term())], None, 100)
                .unwrap_err();
            assert!(matches!(err, PipelineError::InvalidTerm(_)));
        }
        for bad_span in [0.0, -3.0, 0.5] {
            let term = close.ewma_span(bad_span, 10).into_term();
            assert!(crate::pipeline::graph::compile(&[("x".to_string(), term)], None, 100).is_err());
        }

        assert!(WindowTransform::ExponentialWeightedMean { decay_rate: 1.0 }.validate().is_ok());
        let span = close.ewma_span(9.0, 10).into_term();
        assert!(crate::pipeline::graph::compile(&[("x".to_string(), span)], None, 100).is_ok());
    }
}
