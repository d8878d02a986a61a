use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

/// The eight canonical nutrient values of a scan, each per prepared serving.
/// Every key is always serialized; `null` means the value was not readable
/// from the label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub energy_kcal: Option<f64>,
    pub fat_g: Option<f64>,
    pub saturates_g: Option<f64>,
    pub carbohydrate_g: Option<f64>,
    pub sugars_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub protein_g: Option<f64>,
    pub salt_g: Option<f64>,
}

impl NutritionFacts {
    /// Key/value view in canonical key order.
    pub fn entries(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("energy_kcal", self.energy_kcal),
            ("fat_g", self.fat_g),
            ("saturates_g", self.saturates_g),
            ("carbohydrate_g", self.carbohydrate_g),
            ("sugars_g", self.sugars_g),
            ("fiber_g", self.fiber_g),
            ("protein_g", self.protein_g),
            ("salt_g", self.salt_g),
        ]
    }

    /// Traffic-light level per nutrient; unreadable values are omitted.
    pub fn levels(&self) -> BTreeMap<&'static str, NutrientLevel> {
        self.entries()
            .into_iter()
            .filter_map(|(key, value)| classify_nutrient(key, value).map(|level| (key, level)))
            .collect()
    }
}

/// Traffic-light classification of a nutrient amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NutrientLevel {
    Low,
    Medium,
    High,
}

struct Thresholds {
    low: f64,
    high: f64,
    /// More is better (fiber, protein): a small amount reads as High risk.
    invert: bool,
}

/// Per-100g-equivalent bounds used by the front-end tiles. Values at or
/// below `low` are green, at or above `high` are red.
fn thresholds(key: &str) -> Option<Thresholds> {
    let (low, high, invert) = match key {
        "energy_kcal" => (120.0, 360.0, false),
        "fat_g" => (3.0, 17.5, false),
        "saturates_g" => (1.5, 5.0, false),
        "carbohydrate_g" => (15.0, 30.0, false),
        "sugars_g" => (5.0, 22.5, false),
        "fiber_g" => (3.0, 6.0, true),
        "protein_g" => (3.0, 10.0, true),
        "salt_g" => (0.3, 1.5, false),
        _ => return None,
    };
    Some(Thresholds { low, high, invert })
}

/// Classify a nutrient amount. Unknown keys and absent or non-finite values
/// classify as `None`.
pub fn classify_nutrient(key: &str, value: Option<f64>) -> Option<NutrientLevel> {
    let v = value.filter(|v| v.is_finite())?;
    let t = thresholds(key)?;
    let level = if v <= t.low {
        if t.invert {
            NutrientLevel::High
        } else {
            NutrientLevel::Low
        }
    } else if v >= t.high {
        if t.invert {
            NutrientLevel::Low
        } else {
            NutrientLevel::High
        }
    } else {
        NutrientLevel::Medium
    };
    Some(level)
}
