//! Error types for zonal aggregation.

use thiserror::Error;

/// Errors that can occur while aggregating raster values under polygons.
///
/// A polygon that intersects no valid cell is not an error: it yields a
/// record with `count == 0` and null statistics.
#[derive(Error, Debug)]
pub enum ZonalError {
    /// Zero-sized raster, mismatched value buffer, or non-invertible transform.
    #[error("invalid raster: {0}")]
    InvalidRaster(String),

    /// Degenerate polygon (fewer than 3 distinct vertices, non-finite coordinates).
    #[error("invalid polygon {id}: {reason}")]
    InvalidPolygon { id: usize, reason: String },

    /// A requested statistic has no entry in the registry.
    #[error("unknown statistic `{0}`")]
    UnknownStat(String),

    /// `percentile_<q>` with `q` outside `[0, 100]` or not a number.
    #[error("invalid percentile statistic `{0}`")]
    InvalidPercentile(String),

    /// A chunk of the parallel driver failed; no partial results are returned.
    #[error("chunk {chunk} (polygons {start}..{end}) failed: {source}")]
    WorkerFailure {
        chunk: usize,
        start: usize,
        end: usize,
        #[source]
        source: Box<ZonalError>,
    },

    /// A chunk worker panicked.
    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    /// A chunk returned a different number of records than it was given polygons.
    #[error("chunk produced {actual} results for {expected} inputs")]
    ResultLength { expected: usize, actual: usize },

    /// Malformed well-known-text polygon.
    #[error("WKT parse error on line {line}: {message}")]
    Wkt { line: usize, message: String },

    /// The worker pool could not be started.
    #[cfg(feature = "threading")]
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for zonal operations.
pub type Result<T> = std::result::Result<T, ZonalError>;

impl ZonalError {
    /// Chunk index of a [`ZonalError::WorkerFailure`], if this is one.
    pub fn failed_chunk(&self) -> Option<usize> {
        match self {
            ZonalError::WorkerFailure { chunk, .. } => Some(*chunk),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_failure_names_chunk_and_range() {
        let err = ZonalError::WorkerFailure {
            chunk: 2,
            start: 10,
            end: 15,
            source: Box::new(ZonalError::InvalidPolygon { id: 12, reason: "too few vertices".into() }),
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk 2"), "{msg}");
        assert!(msg.contains("10..15"), "{msg}");
        assert!(msg.contains("invalid polygon 12"), "{msg}");
        assert_eq!(err.failed_chunk(), Some(2));
    }

    #[test]
    fn source_chain_reaches_inner_error() {
        use std::error::Error as _;
        let err = ZonalError::WorkerFailure {
            chunk: 0,
            start: 0,
            end: 1,
            source: Box::new(ZonalError::WorkerPanic("boom".into())),
        };
        let inner = err.source().expect("source");
        assert_eq!(inner.to_string(), "worker panicked: boom");
        assert_eq!(ZonalError::UnknownStat("x".into()).failed_chunk(), None);
    }
}
