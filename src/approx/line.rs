//! # Approximation Line
//!
//! A k-NN-distance bound of the form `ln(dist_k) ≈ slope * ln(k) +
//! intercept`, valid from a floor `k0` upward. Below the floor the
//! curve carries no information: in log space the line evaluates to
//! `+inf`, in distance space to `0.0` (a point whose first `k0 - 1`
//! neighbors are coincident has k-distance exactly zero there, so zero
//! is both a safe lower and a safe upper bound).
//!
//! ## Binary Layout (20 bytes)
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  --------------------------------
//! 0       4     k0         validity floor (u32 LE), >= 1
//! 4       8     slope      f64 LE
//! 12      8     intercept  f64 LE
//! ```
//!
//! An absent (not yet fitted) line is encoded as 20 zero bytes; `k0 = 0`
//! never occurs in a fitted line.

/// Serialized size of one line (also used for absent lines).
pub const LINE_ENCODED_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproximationLine {
    k0: u32,
    slope: f64,
    intercept: f64,
}

impl ApproximationLine {
    pub fn new(k0: u32, slope: f64, intercept: f64) -> Self {
        debug_assert!(k0 >= 1, "validity floor must be at least 1");
        Self {
            k0,
            slope,
            intercept,
        }
    }

    /// A line for a point whose entire sampled range is zero distances:
    /// the floor sits above every queryable k and the affine extension
    /// evaluates to distance zero everywhere.
    pub fn degenerate(k0: u32) -> Self {
        Self {
            k0,
            slope: 0.0,
            intercept: f64::NEG_INFINITY,
        }
    }

    pub fn k0(&self) -> u32 {
        self.k0
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Log-space value at k; `+inf` below the validity floor.
    pub fn value(&self, k: u32) -> f64 {
        if k < self.k0 {
            return f64::INFINITY;
        }
        self.eval_log(k)
    }

    /// The affine formula without the floor guard. Used when a node
    /// envelope evaluates children at a shared floor that may sit below
    /// this line's own: under the floor only zero-distance samples
    /// exist, which any finite value bounds.
    pub fn eval_log(&self, k: u32) -> f64 {
        self.slope * (k as f64).ln() + self.intercept
    }

    /// Distance-space value at k; `0.0` below the validity floor.
    pub fn knn_distance(&self, k: u32) -> f64 {
        if k < self.k0 {
            return 0.0;
        }
        self.eval_log(k).exp()
    }

    pub fn encode_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.k0.to_le_bytes());
        buf[4..12].copy_from_slice(&self.slope.to_le_bytes());
        buf[12..20].copy_from_slice(&self.intercept.to_le_bytes());
    }

    /// Decodes a line, or `None` for the all-zero absent encoding.
    pub fn decode_from(buf: &[u8]) -> Option<Self> {
        let k0 = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if k0 == 0 {
            return None;
        }
        let slope = f64::from_le_bytes(buf[4..12].try_into().unwrap());
        let intercept = f64::from_le_bytes(buf[12..20].try_into().unwrap());
        Some(Self {
            k0,
            slope,
            intercept,
        })
    }

    /// Encodes an optional line; absent lines become 20 zero bytes.
    pub fn encode_opt(line: &Option<Self>, buf: &mut [u8]) {
        match line {
            Some(l) => l.encode_to(buf),
            None => buf[..LINE_ENCODED_SIZE].fill(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_infinite_below_the_floor() {
        let line = ApproximationLine::new(3, 0.5, 1.0);

        assert_eq!(line.value(1), f64::INFINITY);
        assert_eq!(line.value(2), f64::INFINITY);
        assert!(line.value(3).is_finite());
    }

    #[test]
    fn value_is_nondecreasing_for_nonnegative_slope() {
        let line = ApproximationLine::new(2, 0.7, -0.3);

        let mut prev = line.value(2);
        for k in 3..=50 {
            let v = line.value(k);
            assert!(v >= prev, "value decreased at k={k}");
            prev = v;
        }
    }

    #[test]
    fn knn_distance_is_zero_below_floor_and_exp_above() {
        let line = ApproximationLine::new(4, 0.5, 0.0);

        assert_eq!(line.knn_distance(3), 0.0);
        let expected = (0.5 * (4f64).ln()).exp();
        assert!((line.knn_distance(4) - expected).abs() < 1e-12);
    }

    #[test]
    fn degenerate_line_is_zero_everywhere_above_its_floor() {
        let line = ApproximationLine::degenerate(11);

        assert_eq!(line.knn_distance(5), 0.0);
        assert_eq!(line.knn_distance(11), 0.0);
        assert_eq!(line.value(11), f64::NEG_INFINITY);
    }

    #[test]
    fn codec_round_trip() {
        let line = ApproximationLine::new(2, 0.731, -1.25);
        let mut buf = [0u8; LINE_ENCODED_SIZE];
        line.encode_to(&mut buf);

        let decoded = ApproximationLine::decode_from(&buf).unwrap();
        assert_eq!(decoded, line);
    }

    #[test]
    fn absent_line_encodes_as_zeros() {
        let mut buf = [0xFFu8; LINE_ENCODED_SIZE];
        ApproximationLine::encode_opt(&None, &mut buf);

        assert_eq!(buf, [0u8; LINE_ENCODED_SIZE]);
        assert!(ApproximationLine::decode_from(&buf).is_none());
    }
}
