//! Zonal statistics of a raster grid under a set of polygons, with a chunked
//! parallel driver.
//!
//! ```no_run
//! use zonal_core::{compute_stats_parallel, Affine, ParallelConfig, Polygon, RasterGrid, StatRegistry, StatsConfig};
//!
//! # fn main() -> zonal_core::Result<()> {
//! let raster = RasterGrid::new(2, 2, vec![1.0, 2.0, 3.0, 4.0], Affine::from_gdal(0.0, 1.0, 0.0, 2.0, 0.0, -1.0), None)?;
//! let polygons = vec![Polygon::rectangle(0, 0.0, 0.0, 2.0, 2.0)];
//! let stats = compute_stats_parallel(&raster, &polygons, &StatsConfig::default(), &StatRegistry::default(), &ParallelConfig::default())?;
//! assert_eq!(stats[0].count, 4);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod parallel;
pub mod polygon;
pub mod raster;
pub mod rasterize;
pub mod record;
pub mod stats;
pub mod wkt;

pub use aggregator::{compute_stats, ZonalStats};
pub use config::{CellInclusion, ParallelConfig, StatsConfig};
pub use error::{Result, ZonalError};
pub use parallel::{chunk_ranges, chunk_ranges_by_size, compute_stats_parallel, run_chunked};
pub use polygon::{Bounds, Point, Polygon};
pub use raster::{Affine, RasterGrid};
pub use record::StatisticsRecord;
pub use stats::{StatFn, StatPlan, StatRegistry};
pub use wkt::{parse_wkt_lines, parse_wkt_polygon};
