//! # Error Taxonomy
//!
//! All fallible operations return [`eyre::Result`]; errors that callers
//! can meaningfully distinguish are raised as [`TreeError`] values so
//! they survive a `downcast_ref` through the report chain.
//!
//! ## Categories
//!
//! | Variant                 | Raised by                         | Fatal |
//! |-------------------------|-----------------------------------|-------|
//! | `Configuration`         | capacity computation at init      | yes   |
//! | `InvalidQueryParameter` | `reverse_knn_query` with k > kmax | yes   |
//! | `UnsupportedOperation`  | single-object `insert`            | yes   |
//! | `Serialization`         | corrupt/truncated page reads      | yes   |
//!
//! Every failure is deterministic given the same input; there is no
//! transient category and nothing is retried. The numerical cross-check
//! between the two conservative fitting strategies is *not* an error:
//! it is logged as a `tracing` warning and does not change any stored
//! result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("page size of {page_size} bytes is too small: {kind} capacity would be {capacity}")]
    Configuration {
        page_size: usize,
        kind: &'static str,
        capacity: usize,
    },

    #[error("parameter k = {k} must be less or equal than kmax = {kmax}")]
    InvalidQueryParameter { k: usize, kmax: usize },

    #[error("{0}")]
    UnsupportedOperation(&'static str),

    #[error("corrupt page {page}: {reason}")]
    Serialization { page: u32, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_survive_eyre_downcast() {
        let report: eyre::Report = TreeError::InvalidQueryParameter { k: 12, kmax: 10 }.into();

        let err = report.downcast_ref::<TreeError>().unwrap();
        assert!(matches!(
            err,
            TreeError::InvalidQueryParameter { k: 12, kmax: 10 }
        ));
    }

    #[test]
    fn display_names_the_offending_values() {
        let err = TreeError::Configuration {
            page_size: 64,
            kind: "leaf",
            capacity: 1,
        };
        let msg = err.to_string();

        assert!(msg.contains("64"));
        assert!(msg.contains("leaf"));
    }
}
