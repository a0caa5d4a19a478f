// =============================================================================
// Trend Engine — multi-horizon EWMA crossover score
// =============================================================================
//
// Six finite exponentially weighted moving averages are taken over the daily
// closes (most recent first), each at a different decay λ:
//
//   w(i) = (1 − λ)·λ^i                       i = 0..n−1
//   MA   = Σ w(i)·price(i)·nf / Σ w(i)
//
// The weights of a finite series do not sum to 1, so the average is divided
// by the weight sum. `nf` is a per-horizon normalisation factor that slightly
// inflates the two longest averages.
//
// Four crossovers between a shorter and a longer horizon are signed and
// averaged:
//
//   d1 = MA0 − MA2   d2 = MA1 − MA3   d3 = MA2 − MA4   d4 = MA3 − MA5
//   sign(d) = +1 if d ≥ 0 else −1
//   score   = mean(signs) ∈ {−1, −0.5, 0, 0.5, 1}
//
// Fewer than MIN_CLOSES prices yields a neutral 0, not an error.
// =============================================================================

use serde::Serialize;
use tracing::warn;

use crate::market_data::Candle;

/// Minimum history length for a non-neutral score.
pub const MIN_CLOSES: usize = 180;

/// Decay factors, shortest horizon first.
pub const LAMBDAS: [f64; 6] = [
    0.5,
    0.757858283,
    0.870550563,
    0.933032992,
    0.965936329,
    0.982820599,
];

/// Normalisation factors matching [`LAMBDAS`].
pub const NORMALIZATION: [f64; 6] = [1.0000, 1.0000, 1.0000, 1.0000, 1.0020, 1.0462];

/// (shorter, longer) horizon indices of each crossover.
const CROSSOVERS: [(usize, usize); 4] = [(0, 2), (1, 3), (2, 4), (3, 5)];

/// Intermediate values of a scored series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBreakdown {
    pub moving_averages: [f64; 6],
    pub differences: [f64; 4],
    pub signs: [i8; 4],
    pub score: f64,
}

/// Outcome of evaluating a close series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrendEvaluation {
    /// Too little history; reported as a neutral score.
    Insufficient { available: usize },
    Scored(TrendBreakdown),
}

impl TrendEvaluation {
    /// The bounded score. Insufficient history collapses to 0, which is
    /// indistinguishable from a genuinely neutral trend.
    pub fn score(&self) -> f64 {
        match self {
            Self::Insufficient { .. } => 0.0,
            Self::Scored(breakdown) => breakdown.score,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::Insufficient { .. })
    }
}

/// Finite EWMA of `prices` (index 0 = most recent) with decay `lambda`,
/// each price scaled by `nf`.
///
/// Returns 0.0 for an empty series.
pub fn ewma(prices: &[f64], lambda: f64, nf: f64) -> f64 {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    let mut decay = 1.0;
    for &price in prices {
        let w = (1.0 - lambda) * decay;
        weighted += w * (price * nf);
        weight_sum += w;
        decay *= lambda;
    }
    if weight_sum == 0.0 {
        return 0.0;
    }
    weighted / weight_sum
}

/// Evaluate closes given most recent first.
pub fn evaluate_recent_first(closes: &[f64]) -> TrendEvaluation {
    if closes.len() < MIN_CLOSES {
        return TrendEvaluation::Insufficient {
            available: closes.len(),
        };
    }

    let mut moving_averages = [0.0; 6];
    for (ma, (&lambda, &nf)) in moving_averages
        .iter_mut()
        .zip(LAMBDAS.iter().zip(NORMALIZATION.iter()))
    {
        *ma = ewma(closes, lambda, nf);
    }

    let mut differences = [0.0; 4];
    let mut signs = [0i8; 4];
    for (k, &(short, long)) in CROSSOVERS.iter().enumerate() {
        differences[k] = moving_averages[short] - moving_averages[long];
        // Equality counts as bullish.
        signs[k] = if differences[k] >= 0.0 { 1 } else { -1 };
    }

    let score = signs.iter().map(|&s| f64::from(s)).sum::<f64>() / signs.len() as f64;

    TrendEvaluation::Scored(TrendBreakdown {
        moving_averages,
        differences,
        signs,
        score,
    })
}

/// Evaluate closes given in chronological order (oldest first), as candle
/// endpoints return them.
pub fn evaluate(closes_oldest_first: &[f64]) -> TrendEvaluation {
    let recent_first: Vec<f64> = closes_oldest_first.iter().rev().copied().collect();
    evaluate_recent_first(&recent_first)
}

/// Score a chronological close series.
pub fn score(closes_oldest_first: &[f64]) -> f64 {
    evaluate(closes_oldest_first).score()
}

/// Parse candle closes to `f64`, oldest first.
///
/// Unparseable close text becomes 0.0 and is logged rather than rejected,
/// which can skew the score.
pub fn closes_from_candles(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .map(|c| match c.close.trim().parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                warn!(open_time = c.open_time, close = %c.close, "unparseable close price, using 0.0");
                0.0
            }
        })
        .collect()
}

/// Score a candle series as fetched (oldest first).
pub fn evaluate_candles(candles: &[Candle]) -> TrendEvaluation {
    evaluate(&closes_from_candles(candles))
}
