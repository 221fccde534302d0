//! Chunked parallel driver.
//!
//! The input is split into contiguous chunks, each chunk runs as an
//! independent job on a fixed-size worker pool, and the per-chunk outputs are
//! concatenated in chunk order. Completion order never affects the result.
//! Any failing or panicking chunk fails the whole call; nothing partial is
//! returned.
use std::any::Any;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

#[cfg(feature = "threading")]
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregator::ZonalStats;
use crate::config::{ParallelConfig, StatsConfig};
use crate::error::{Result, ZonalError};
use crate::polygon::Polygon;
use crate::raster::RasterGrid;
use crate::record::StatisticsRecord;
use crate::stats::StatRegistry;

/// Split `0..len` into `worker_count` contiguous ranges of ⌈len / worker_count⌉
/// items (the last may be shorter). A `worker_count` of 0 is treated as 1.
pub fn chunk_ranges(len: usize, worker_count: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    chunk_ranges_by_size(len, len.div_ceil(worker_count.max(1)))
}

/// Split `0..len` into contiguous ranges of `chunk_size` items (the last may be shorter).
pub fn chunk_ranges_by_size(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let size = chunk_size.max(1);
    (0..len).step_by(size).map(|start| start..(start + size).min(len)).collect()
}

/// Run `job` over contiguous chunks of `items` on a worker pool and merge the
/// outputs in chunk order.
///
/// `job` must return exactly one output per input item. The first failing
/// chunk (in chunk order) is reported as [`ZonalError::WorkerFailure`].
pub fn run_chunked<T, R, F>(items: &[T], parallel: &ParallelConfig, job: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Result<Vec<R>> + Sync,
{
    let workers = parallel.effective_workers();
    let ranges = match parallel.chunk_size {
        Some(size) => chunk_ranges_by_size(items.len(), size),
        None => chunk_ranges(items.len(), workers),
    };
    if ranges.is_empty() {
        return Ok(Vec::new());
    }
    info!(items = items.len(), chunks = ranges.len(), workers, "dispatching chunks");

    let run_chunk = |(chunk, range): (usize, &Range<usize>)| -> Result<Vec<R>> {
        debug!(chunk, start = range.start, end = range.end, "chunk started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&items[range.clone()])))
            .unwrap_or_else(|payload| Err(ZonalError::WorkerPanic(panic_message(payload.as_ref()))))
            .and_then(|out| {
                if out.len() == range.len() {
                    Ok(out)
                } else {
                    Err(ZonalError::ResultLength { expected: range.len(), actual: out.len() })
                }
            });
        match outcome {
            Ok(out) => {
                debug!(chunk, "chunk finished");
                Ok(out)
            }
            Err(source) => {
                warn!(chunk, start = range.start, end = range.end, error = %source, "chunk failed");
                Err(ZonalError::WorkerFailure {
                    chunk,
                    start: range.start,
                    end: range.end,
                    source: Box::new(source),
                })
            }
        }
    };

    #[cfg(feature = "threading")]
    let results: Vec<Result<Vec<R>>> = {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("zonal-worker-{i}"))
            .build()?;
        pool.install(|| ranges.par_iter().enumerate().map(run_chunk).collect())
    };
    #[cfg(not(feature = "threading"))]
    let results: Vec<Result<Vec<R>>> = ranges.iter().enumerate().map(run_chunk).collect();

    let mut merged = Vec::with_capacity(items.len());
    for chunk in results {
        merged.extend(chunk?);
    }
    Ok(merged)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Zonal statistics over chunks of `polygons` in parallel.
///
/// The raster and statistics are validated before any chunk is dispatched;
/// the result equals [`compute_stats`](crate::aggregator::compute_stats)
/// element for element.
pub fn compute_stats_parallel(
    raster: &RasterGrid,
    polygons: &[Polygon],
    config: &StatsConfig,
    registry: &StatRegistry,
    parallel: &ParallelConfig,
) -> Result<Vec<StatisticsRecord>> {
    let zonal = ZonalStats::new(raster, config, registry)?;
    run_chunked(polygons, parallel, |chunk| zonal.compute(chunk))
}
