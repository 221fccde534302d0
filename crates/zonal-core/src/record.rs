use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Statistics of one polygon.
///
/// `count` is the number of valid cells under the polygon. `values` holds the
/// other requested statistics in request order; all of them are `None` when
/// `count == 0`, which keeps "no data" distinct from "data equal to zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub id: usize,
    pub count: usize,
    pub values: Vec<(String, Option<f64>)>,
}

impl StatisticsRecord {
    pub fn get(&self, name: &str) -> Option<f64> {
        if name == crate::stats::COUNT {
            return Some(self.count as f64);
        }
        self.values.iter().find(|(n, _)| n == name).and_then(|(_, v)| *v)
    }

    pub fn min(&self) -> Option<f64> {
        self.get("min")
    }

    pub fn max(&self) -> Option<f64> {
        self.get("max")
    }

    pub fn std(&self) -> Option<f64> {
        self.get("std")
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bitwise equality, so two runs can be checked for identical output.
    pub fn bit_identical(&self, other: &Self) -> bool {
        self.id == other.id
            && self.count == other.count
            && self.values.len() == other.values.len()
            && self.values.iter().zip(&other.values).all(|((na, va), (nb, vb))| {
                na == nb && va.map(f64::to_bits) == vb.map(f64::to_bits)
            })
    }

    /// Feature properties: `id`, `count`, then each statistic (`null` for
    /// `None` or non-finite values).
    pub fn to_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("id".into(), Value::from(self.id));
        props.insert("count".into(), Value::from(self.count));
        for (name, v) in &self.values {
            let json = v.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null);
            props.insert(name.clone(), json);
        }
        props
    }
}
