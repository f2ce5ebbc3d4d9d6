//! Monotonic interpolation table mapping one scalar domain onto another.
//!
//! The true mapping between a scroll cursor and a hid (or between a hid and
//! its row offset) is unknown until real server responses sample it, so each
//! response pins a few exact points and everything in between is linearly
//! interpolated.

use std::collections::BTreeMap;

/// Sampled function `x -> y` with linear interpolation between known points.
///
/// x values are quantised to `x_precision` decimal places before storage, so
/// near-duplicate samples collapse into one point and the point set stays
/// bounded. y values are rounded to `y_precision` decimal places.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFit {
    points: BTreeMap<i64, f64>,
    domain: Option<(f64, f64)>,
    x_precision: u32,
    y_precision: u32,
}

impl CurveFit {
    /// Create an empty fit over an unbounded domain.
    pub fn new(x_precision: u32, y_precision: u32) -> Self {
        Self {
            points: BTreeMap::new(),
            domain: None,
            x_precision,
            y_precision,
        }
    }

    /// Restrict the fit to `[min, max]`.
    pub fn with_domain(mut self, min: f64, max: f64) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.domain = Some((lo, hi));
        self
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point has been sampled yet.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Record `y` at `x`, replacing any point at the same quantised x.
    ///
    /// Returns `false` (and stores nothing) for non-finite input or an `x`
    /// outside the domain.
    pub fn set(&mut self, x: f64, y: f64) -> bool {
        if !x.is_finite() || !y.is_finite() || !self.in_domain(x) {
            return false;
        }
        let q = self.quantize(x);
        let y = round_to(y, self.y_precision);
        self.points.insert(q, y);
        true
    }

    /// Look up `y` at `x`.
    ///
    /// An exactly stored x returns its y. Without `interpolate` any other x
    /// (including anything outside the domain) returns `None`. With
    /// `interpolate`, x is clamped into the domain and linearly interpolated
    /// between its nearest neighbours; with a neighbour on one side only, that
    /// neighbour's y is returned.
    pub fn get(&self, x: f64, interpolate: bool) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }
        if !interpolate && !self.in_domain(x) {
            return None;
        }

        let x = self.clamp(x);
        let q = self.quantize(x);
        if let Some(y) = self.points.get(&q) {
            return Some(*y);
        }
        if !interpolate {
            return None;
        }

        let below = self.points.range(..q).next_back();
        let above = self.points.range(q..).next();
        match (below, above) {
            (Some((qa, ya)), Some((qb, yb))) => {
                let xa = self.dequantize(*qa);
                let xb = self.dequantize(*qb);
                let t = (x - xa) / (xb - xa);
                Some(ya + t * (yb - ya))
            }
            (Some((_, y)), None) | (None, Some((_, y))) => Some(*y),
            (None, None) => None,
        }
    }

    fn in_domain(&self, x: f64) -> bool {
        match self.domain {
            Some((lo, hi)) => x >= lo && x <= hi,
            None => true,
        }
    }

    fn clamp(&self, x: f64) -> f64 {
        match self.domain {
            Some((lo, hi)) => x.clamp(lo, hi),
            None => x,
        }
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.x_precision as i32)
    }

    fn quantize(&self, x: f64) -> i64 {
        (x * self.scale()).round() as i64
    }

    fn dequantize(&self, q: i64) -> f64 {
        q as f64 / self.scale()
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}
