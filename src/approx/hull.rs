//! # Convex Hull of the Log-Log Samples
//!
//! Builds the lower and upper convex hulls of a 2-D point set whose x
//! coordinates are already strictly increasing (they are ln(k) for
//! consecutive k). Each hull is an index sequence into the input
//! arrays; the fitting code only ever inspects hull points, because the
//! optimal bounding line of a convex region touches its boundary.
//!
//! ## Construction
//!
//! A single left-to-right scan per hull with a stack (the monotone
//! chain scan). Before appending point `i`, pop the stack while the
//! slope of the last retained segment fails the hull's monotonicity:
//!
//! - lower hull: segment slopes must strictly increase, so pop while
//!   `slope(a, b) >= slope(b, i)`;
//! - upper hull: segment slopes must strictly decrease, so pop while
//!   `slope(a, b) <= slope(b, i)`.
//!
//! Using one comparison operator per hull resolves collinear runs
//! consistently (interior collinear points are dropped). O(n) after the
//! input is sorted, which is guaranteed here.

#[derive(Debug, Clone)]
pub struct ConvexHull {
    lower: Vec<usize>,
    upper: Vec<usize>,
}

impl ConvexHull {
    /// Builds both hulls. `xs` must be strictly increasing and the two
    /// slices must have equal, nonzero length.
    pub fn build(xs: &[f64], ys: &[f64]) -> Self {
        debug_assert_eq!(xs.len(), ys.len());
        debug_assert!(!xs.is_empty());
        debug_assert!(xs.windows(2).all(|w| w[0] < w[1]));

        Self {
            lower: scan(xs, ys, |prev, next| prev >= next),
            upper: scan(xs, ys, |prev, next| prev <= next),
        }
    }

    /// Indices of the lower hull, left to right.
    pub fn lower(&self) -> &[usize] {
        &self.lower
    }

    /// Indices of the upper hull, left to right.
    pub fn upper(&self) -> &[usize] {
        &self.upper
    }
}

fn slope(xs: &[f64], ys: &[f64], i: usize, j: usize) -> f64 {
    (ys[j] - ys[i]) / (xs[j] - xs[i])
}

fn scan(xs: &[f64], ys: &[f64], pop: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let mut stack: Vec<usize> = Vec::with_capacity(xs.len());
    for i in 0..xs.len() {
        while stack.len() >= 2 {
            let b = stack[stack.len() - 1];
            let a = stack[stack.len() - 2];
            if pop(slope(xs, ys, a, b), slope(xs, ys, b, i)) {
                stack.pop();
            } else {
                break;
            }
        }
        stack.push(i);
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bounds(xs: &[f64], ys: &[f64], hull: &ConvexHull) {
        // every point on-or-above the lower hull and on-or-below the upper
        for (chain, sign) in [(hull.lower(), 1.0), (hull.upper(), -1.0)] {
            for seg in chain.windows(2) {
                let (i, j) = (seg[0], seg[1]);
                let m = (ys[j] - ys[i]) / (xs[j] - xs[i]);
                for p in 0..xs.len() {
                    if xs[p] < xs[i] || xs[p] > xs[j] {
                        continue;
                    }
                    let on_line = ys[i] + m * (xs[p] - xs[i]);
                    assert!(
                        sign * (ys[p] - on_line) >= -1e-9,
                        "point {p} violates hull segment {i}-{j}"
                    );
                }
            }
        }
    }

    #[test]
    fn endpoints_belong_to_both_hulls() {
        let xs: Vec<f64> = (1..=8).map(|k| (k as f64).ln()).collect();
        let ys = [0.1, 0.9, 0.4, 1.3, 1.1, 1.8, 1.5, 2.2];

        let hull = ConvexHull::build(&xs, &ys);

        for chain in [hull.lower(), hull.upper()] {
            assert_eq!(*chain.first().unwrap(), 0);
            assert_eq!(*chain.last().unwrap(), xs.len() - 1);
        }
        assert_bounds(&xs, &ys, &hull);
    }

    #[test]
    fn convex_increasing_curve_has_full_lower_hull() {
        // y = x^2 over increasing x: every point is on the lower hull,
        // the upper hull is just the two endpoints.
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|x| x * x).collect();

        let hull = ConvexHull::build(&xs, &ys);

        assert_eq!(hull.lower(), &[0, 1, 2, 3, 4]);
        assert_eq!(hull.upper(), &[0, 4]);
        assert_bounds(&xs, &ys, &hull);
    }

    #[test]
    fn collinear_interior_points_are_dropped() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.0, 1.0, 2.0, 3.0];

        let hull = ConvexHull::build(&xs, &ys);

        assert_eq!(hull.lower(), &[0, 3]);
        assert_eq!(hull.upper(), &[0, 3]);
    }

    #[test]
    fn single_point_and_pair_inputs() {
        let one = ConvexHull::build(&[0.0], &[2.0]);
        assert_eq!(one.lower(), &[0]);
        assert_eq!(one.upper(), &[0]);

        let two = ConvexHull::build(&[0.0, 1.0], &[2.0, 1.0]);
        assert_eq!(two.lower(), &[0, 1]);
        assert_eq!(two.upper(), &[0, 1]);
    }

    #[test]
    fn random_walk_samples_stay_inside_both_hulls() {
        // deterministic ragged data
        let n = 40;
        let xs: Vec<f64> = (1..=n).map(|k| (k as f64).ln()).collect();
        let mut state = 0x9E3779B97F4A7C15u64;
        let mut y = 0.0;
        let ys: Vec<f64> = (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                y += ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.4;
                y
            })
            .collect();

        let hull = ConvexHull::build(&xs, &ys);
        assert_bounds(&xs, &ys, &hull);
    }
}
