use serde::{Deserialize, Serialize};

/// Rule deciding which raster cells belong to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellInclusion {
    /// Cell centre inside the polygon.
    #[default]
    Center,
    /// Centre inside, or any polygon edge crossing the cell.
    AllTouched,
}

/// What to compute for every polygon. Shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Statistic names, looked up in the [`StatRegistry`](crate::stats::StatRegistry).
    pub stats: Vec<String>,
    pub inclusion: CellInclusion,
    /// Replaces the raster's own no-data value when set.
    pub nodata_override: Option<f64>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            stats: ["min", "max", "count", "std"].iter().map(|s| s.to_string()).collect(),
            inclusion: CellInclusion::Center,
            nodata_override: None,
        }
    }
}

impl StatsConfig {
    pub fn with_stats<I, S>(stats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stats: stats.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Worker pool sizing for the chunked driver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Pool size; 0 = number of available processing units.
    pub workers: usize,
    /// Fixed chunk length. `None` = ⌈N / workers⌉, one chunk per worker.
    pub chunk_size: Option<usize>,
}

impl ParallelConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self { workers, chunk_size: None }
    }

    /// `workers`, with 0 resolved to the available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requests_benchmark_stats() {
        let cfg = StatsConfig::default();
        assert_eq!(cfg.stats, vec!["min", "max", "count", "std"]);
        assert_eq!(cfg.inclusion, CellInclusion::Center);
        assert!(cfg.nodata_override.is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: StatsConfig = serde_json::from_str(r#"{"inclusion":"all_touched"}"#).unwrap();
        assert_eq!(cfg.inclusion, CellInclusion::AllTouched);
        assert_eq!(cfg.stats.len(), 4);

        let par: ParallelConfig = serde_json::from_str(r#"{"chunk_size":500}"#).unwrap();
        assert_eq!(par.workers, 0);
        assert_eq!(par.chunk_size, Some(500));
    }

    #[test]
    fn zero_workers_resolves_to_cpus() {
        assert!(ParallelConfig::default().effective_workers() >= 1);
        assert_eq!(ParallelConfig::with_workers(3).effective_workers(), 3);
    }
}
