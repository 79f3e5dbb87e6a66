//! # k-Distance Approximation
//!
//! Every indexed point has a k-NN-distance curve: the distance to its
//! k-th nearest neighbor as a function of k. In log-log space this curve
//! is close to linear for real data (the slope is the local fractal
//! dimension), which is what makes a two-parameter line a usable bound.
//!
//! The modules here build those bounds:
//!
//! - [`line`]: the [`ApproximationLine`](line::ApproximationLine)
//!   itself, slope/intercept over ln(k) with a validity floor k0.
//! - [`hull`]: lower/upper convex hulls of the (ln k, ln dist) samples;
//!   the optimal bounding lines touch only hull points, so fitting never
//!   has to look at interior samples.
//! - [`fit`]: the constrained regressions: a conservative line that
//!   upper-bounds every sample and a progressive line that lower-bounds
//!   them, each minimizing squared log-error among valid candidates.

pub mod fit;
pub mod hull;
pub mod line;

pub use self::fit::{fit_conservative, fit_progressive, FitSums, UpperFitStrategy};
pub use self::hull::ConvexHull;
pub use self::line::ApproximationLine;
