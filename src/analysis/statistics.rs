//! Series alignment and correlation statistics

use crate::records::Timestamp;
use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One observation of a numeric series
pub type Point = (Timestamp, f64);

/// A pair of observations matched across two series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignedPoint {
    pub timestamp_a: Timestamp,
    pub timestamp_b: Timestamp,
    pub a: f64,
    pub b: f64,
}

/// Average the values that share a timestamp
///
/// The result is sorted by timestamp and has at most one point per timestamp.
pub fn collapse(points: impl IntoIterator<Item = Point>) -> Vec<Point> {
    let mut buckets: BTreeMap<Timestamp, (f64, usize)> = BTreeMap::new();
    for (timestamp, value) in points {
        let bucket = buckets.entry(timestamp).or_insert((0.0, 0));
        bucket.0 += value;
        bucket.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(timestamp, (sum, count))| (timestamp, sum / count as f64))
        .collect()
}

/// Inner join of two series with nearest-match tolerance
///
/// Candidate pairs within `tolerance` are matched greedily by smallest time
/// distance, ties broken by the (earlier, later) timestamp pair. Each point is
/// used at most once. The ordering key does not depend on which series is
/// passed first, so `align(a, b)` and `align(b, a)` match the same points.
/// Both inputs must hold at most one point per timestamp (see [`collapse`]).
/// The result is sorted by the timestamp of `a`.
pub fn align(a: &[Point], b: &[Point], tolerance: Duration) -> Vec<AlignedPoint> {
    let mut candidates: Vec<(Duration, Timestamp, Timestamp, usize, usize)> = Vec::new();
    for (i, (ta, _)) in a.iter().enumerate() {
        for (j, (tb, _)) in b.iter().enumerate() {
            let distance = (*ta - *tb).abs();
            if distance <= tolerance {
                candidates.push((distance, (*ta).min(*tb), (*ta).max(*tb), i, j));
            }
        }
    }
    candidates.sort_by(|x, y| (x.0, x.1, x.2).cmp(&(y.0, y.1, y.2)));

    let mut used_a = vec![false; a.len()];
    let mut used_b = vec![false; b.len()];
    let mut aligned = Vec::new();
    for (_, _, _, i, j) in candidates {
        if used_a[i] || used_b[j] {
            continue;
        }
        used_a[i] = true;
        used_b[j] = true;
        aligned.push(AlignedPoint {
            timestamp_a: a[i].0,
            timestamp_b: b[j].0,
            a: a[i].1,
            b: b[j].1,
        });
    }
    aligned.sort_by_key(|point| point.timestamp_a);
    aligned
}

/// Pearson correlation coefficient, clamped to [-1, 1]
///
/// Returns `None` for fewer than two points, mismatched lengths, or when
/// either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    if is_constant(xs) || is_constant(ys) {
        return None;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    let r = sxy / (sxx.sqrt() * syy.sqrt());
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

fn is_constant(values: &[f64]) -> bool {
    values.iter().all(|v| *v == values[0])
}

/// Strength bucket of a correlation coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    None,
    Weak,
    Moderate,
    Strong,
}

impl Strength {
    /// Bucket by |r|: below 0.2 none, below 0.4 weak, below 0.6 moderate, else strong
    pub fn from_coefficient(r: f64) -> Self {
        let magnitude = r.abs();
        if magnitude < 0.2 {
            Strength::None
        } else if magnitude < 0.4 {
            Strength::Weak
        } else if magnitude < 0.6 {
            Strength::Moderate
        } else {
            Strength::Strong
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::None => "none",
            Strength::Weak => "weak",
            Strength::Moderate => "moderate",
            Strength::Strong => "strong",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-tailed critical t values at alpha = 0.05 for df = 1..=30
const CRITICAL_T_05: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160,
    2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056,
    2.052, 2.048, 2.045, 2.042,
];

/// Upper 2.5% point of the standard normal distribution
const Z_975: f64 = 1.959_963_984_540_054;

/// Two-tailed critical t value at alpha = 0.05
///
/// Exact table values up to 30 degrees of freedom, Cornish-Fisher expansion of
/// the normal quantile beyond that. Returns `None` for zero degrees of freedom.
pub fn critical_t(df: usize) -> Option<f64> {
    match df {
        0 => None,
        1..=30 => Some(CRITICAL_T_05[df - 1]),
        _ => {
            let z = Z_975;
            let v = df as f64;
            let z3 = z.powi(3);
            let z5 = z.powi(5);
            let z7 = z.powi(7);
            Some(
                z + (z3 + z) / (4.0 * v)
                    + (5.0 * z5 + 16.0 * z3 + 3.0 * z) / (96.0 * v * v)
                    + (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / (384.0 * v * v * v),
            )
        }
    }
}

/// t statistic of a correlation coefficient over `n` points
///
/// Infinite (with the sign of `r`) for a perfect correlation.
pub fn t_statistic(r: f64, n: usize) -> f64 {
    let df = n.saturating_sub(2) as f64;
    let denominator = 1.0 - r * r;
    if denominator <= 0.0 {
        return if r >= 0.0 { f64::INFINITY } else { f64::NEG_INFINITY };
    }
    r * (df / denominator).sqrt()
}

/// Whether `r` over `n` points is significant at alpha = 0.05 (two-tailed)
pub fn is_significant(r: f64, n: usize) -> bool {
    match critical_t(n.saturating_sub(2)) {
        Some(critical) => t_statistic(r, n).abs() > critical,
        None => false,
    }
}
