//! Named statistic registry.
//!
//! Built-in and user-supplied statistics share one interface: a pure function
//! over the valid cell values of a zone returning a scalar or `None`. The
//! aggregator resolves the requested names once and invokes the functions per
//! polygon.

pub mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ZonalError};

/// A statistic over the valid cell values of one zone. Must return `None`
/// for an empty slice.
pub type StatFn = Arc<dyn Fn(&[f64]) -> Option<f64> + Send + Sync>;

/// Reserved name: the valid-cell count is always computed and stored on the record.
pub const COUNT: &str = "count";

const PERCENTILE_PREFIX: &str = "percentile_";

/// Name → statistic function lookup table.
#[derive(Clone)]
pub struct StatRegistry {
    funcs: HashMap<String, StatFn>,
}

impl Default for StatRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for StatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatRegistry").field("names", &self.names()).finish()
    }
}

impl StatRegistry {
    /// A registry with no statistics besides the implicit `count`.
    pub fn empty() -> Self {
        Self { funcs: HashMap::new() }
    }

    /// `min`, `max`, `std`, `mean`, `sum`, `median`, `range`, `unique`;
    /// `percentile_<q>` and `count` are resolved without registration.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register("min", builtin::min)
            .register("max", builtin::max)
            .register("std", builtin::std)
            .register("mean", builtin::mean)
            .register("sum", builtin::sum)
            .register("median", builtin::median)
            .register("range", builtin::range)
            .register("unique", builtin::unique);
        reg
    }

    /// Add or replace a statistic. Registering under `count` has no effect on
    /// the record's count.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&[f64]) -> Option<f64> + Send + Sync + 'static,
    {
        self.funcs.insert(name.into(), Arc::new(func));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        name == COUNT || self.funcs.contains_key(name) || parse_percentile(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up one statistic. `percentile_<q>` is synthesised on demand.
    pub fn resolve(&self, name: &str) -> Result<StatFn> {
        if let Some(func) = self.funcs.get(name) {
            return Ok(Arc::clone(func));
        }
        if name.starts_with(PERCENTILE_PREFIX) {
            let q = parse_percentile(name).ok_or_else(|| ZonalError::InvalidPercentile(name.to_string()))?;
            return Ok(Arc::new(move |values: &[f64]| builtin::percentile(values, q)));
        }
        Err(ZonalError::UnknownStat(name.to_string()))
    }

    /// Resolve every requested name up front, so an unknown statistic fails
    /// before any polygon is processed. `count` and duplicates are skipped.
    pub fn plan(&self, names: &[String]) -> Result<StatPlan> {
        let mut entries: Vec<(String, StatFn)> = Vec::with_capacity(names.len());
        for name in names {
            if name == COUNT || entries.iter().any(|(n, _)| n == name) {
                continue;
            }
            entries.push((name.clone(), self.resolve(name)?));
        }
        Ok(StatPlan { entries })
    }
}

fn parse_percentile(name: &str) -> Option<f64> {
    let q: f64 = name.strip_prefix(PERCENTILE_PREFIX)?.parse().ok()?;
    (0.0..=100.0).contains(&q).then_some(q)
}

/// Resolved statistics, in request order.
#[derive(Clone)]
pub struct StatPlan {
    entries: Vec<(String, StatFn)>,
}

impl fmt::Debug for StatPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(n, _)| n)).finish()
    }
}

impl StatPlan {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Evaluate every statistic over `values`. All `None` when `values` is empty.
    pub fn evaluate(&self, values: &[f64]) -> Vec<(String, Option<f64>)> {
        self.entries
            .iter()
            .map(|(name, func)| {
                let v = if values.is_empty() { None } else { func(values) };
                (name.clone(), v)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn builtins_are_registered() {
        let reg = StatRegistry::default();
        for n in ["min", "max", "count", "std", "mean", "sum", "median", "range", "unique", "percentile_90"] {
            assert!(reg.contains(n), "{n}");
        }
        assert!(!reg.contains("model"));
        assert!(!reg.contains("percentile_101"));
    }

    #[test]
    fn custom_statistic_is_resolved_by_name() {
        let mut reg = StatRegistry::default();
        reg.register("model", |v: &[f64]| Some(builtin::max(v)? - builtin::min(v)?));
        let plan = reg.plan(&names(&["min", "model"])).unwrap();
        let out = plan.evaluate(&[3.0, 9.0, 4.0]);
        assert_eq!(out, vec![("min".to_string(), Some(3.0)), ("model".to_string(), Some(6.0))]);
    }

    #[test]
    fn unknown_and_bad_percentile_fail_planning() {
        let reg = StatRegistry::default();
        assert!(matches!(reg.plan(&names(&["min", "mode"])), Err(ZonalError::UnknownStat(n)) if n == "mode"));
        assert!(matches!(reg.plan(&names(&["percentile_x"])), Err(ZonalError::InvalidPercentile(_))));
        assert!(matches!(reg.plan(&names(&["percentile_150"])), Err(ZonalError::InvalidPercentile(_))));
    }

    #[test]
    fn plan_skips_count_and_duplicates() {
        let reg = StatRegistry::default();
        let plan = reg.plan(&names(&["count", "max", "max", "percentile_50"])).unwrap();
        assert_eq!(plan.names().collect::<Vec<_>>(), vec!["max", "percentile_50"]);
        assert_eq!(plan.evaluate(&[1.0, 2.0, 3.0])[1].1, Some(2.0));
    }

    #[test]
    fn empty_values_yield_null_even_for_sloppy_custom_stats() {
        let mut reg = StatRegistry::empty();
        reg.register("zero", |_: &[f64]| Some(0.0));
        let plan = reg.plan(&names(&["zero"])).unwrap();
        assert_eq!(plan.evaluate(&[]), vec![("zero".to_string(), None)]);
    }
}
