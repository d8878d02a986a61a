use serde_json::{Map, Value};
use std::sync::Arc;

use crate::models::nutrition::NutritionFacts;
use crate::models::scan::NutritionRecord;
use crate::services::llm::CompletionClient;

const SYSTEM_PROMPT: &str = "You are a nutrition-label parser.";
const MAX_TOKENS: u32 = 200;

/// Converts cleaned label text into a typed [`NutritionRecord`] through one
/// schema-prompted LLM call.
pub struct NutritionExtractor {
    llm: Option<Arc<dyn CompletionClient>>,
}

impl NutritionExtractor {
    pub fn new(llm: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { llm }
    }

    /// Extract a nutrition record. Never fails: without a configured client
    /// or on transport errors the empty record is returned; when the model
    /// replies with something other than a JSON object, its raw text is
    /// surfaced as the record's `summary` so the user still sees output.
    pub async fn extract(&self, cleaned_text: &str) -> NutritionRecord {
        let Some(llm) = &self.llm else {
            tracing::debug!("no LLM credential configured; returning empty record");
            return NutritionRecord::default();
        };

        let prompt = build_prompt(cleaned_text);
        let content = match llm.complete(SYSTEM_PROMPT, &prompt, MAX_TOKENS).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "extraction call failed; returning empty record");
                return NutritionRecord::default();
            }
        };

        match record_from_json(&content) {
            Some(record) => record,
            None => {
                tracing::warn!(chars = content.len(), "model output was not a JSON object");
                NutritionRecord {
                    summary: content,
                    ..Default::default()
                }
            }
        }
    }
}

/// Strict structured-output check, independent of the network call.
/// Returns `None` unless `content` parses as a JSON object; the record is
/// then assembled from the eight canonical nutrition keys (extra keys are
/// discarded, the legacy `fibre_g` spelling maps onto `fiber_g`), with every
/// value coerced to a float where convertible.
pub fn record_from_json(content: &str) -> Option<NutritionRecord> {
    let value: Value = serde_json::from_str(content).ok()?;
    let obj = value.as_object()?;
    let nut = obj.get("nutrition").and_then(Value::as_object);

    let nutrition = NutritionFacts {
        energy_kcal: nutrient(nut, "energy_kcal"),
        fat_g: nutrient(nut, "fat_g"),
        saturates_g: nutrient(nut, "saturates_g"),
        carbohydrate_g: nutrient(nut, "carbohydrate_g"),
        sugars_g: nutrient(nut, "sugars_g"),
        fiber_g: nutrient(nut, "fiber_g").or_else(|| nutrient(nut, "fibre_g")),
        protein_g: nutrient(nut, "protein_g"),
        salt_g: nutrient(nut, "salt_g"),
    };

    Some(NutritionRecord {
        product_name: string_field(obj, "product_name"),
        expiry_date: string_field(obj, "expiry_date"),
        flags: obj
            .get("flags")
            .and_then(Value::as_array)
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        nutrition,
        summary: string_field(obj, "summary").unwrap_or_default(),
        alternative: string_field(obj, "alternative").unwrap_or_default(),
    })
}

fn nutrient(nut: Option<&Map<String, Value>>, key: &str) -> Option<f64> {
    nut?.get(key).and_then(coerce_f64)
}

/// Accept both JSON numbers and numeric strings; anything else is null.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn build_prompt(cleaned_text: &str) -> String {
    format!(
        concat!(
            "The following text has been cleaned so that each nutrient row shows a single ",
            "'prepared' value, for example:\n",
            "  Energy 232 kcal\n",
            "  Fat 5.5 g\n",
            "  Saturates 2.4 g\n",
            "  Carbohydrate 33.7 g\n",
            "  Sugars 15.3 g\n",
            "  Fiber 3.5 g\n",
            "  Protein 10.3 g\n",
            "  Salt 0.30 g\n\n",
            "Your job:\n",
            "  1) If you see any expiry/best-before date (e.g. 'BEST BEFORE: 2025-08-01'), ",
            "return it as \"YYYY-MM-DD\". If there is no explicit date, return null.\n",
            "  2) Identify any red-alert flags (e.g. \"High Sugar\" if sugars per prepared ",
            "serving > 15 g). You decide reasonable cutoffs.\n",
            "  3) If you can identify the product name, include it.\n",
            "  4) Write a one-sentence summary of the product's nutrition profile and a ",
            "short alternative product name or tagline.\n",
            "  5) Return exactly one JSON object with these keys (no others):\n",
            "      {{\n",
            "        \"product_name\": <string|null>,\n",
            "        \"expiry_date\": <string|null>,\n",
            "        \"flags\": [ /* array of strings */ ],\n",
            "        \"nutrition\": {{\n",
            "          \"energy_kcal\": <number>,\n",
            "          \"fat_g\": <number>,\n",
            "          \"saturates_g\": <number>,\n",
            "          \"carbohydrate_g\": <number>,\n",
            "          \"sugars_g\": <number>,\n",
            "          \"fiber_g\": <number>,\n",
            "          \"protein_g\": <number>,\n",
            "          \"salt_g\": <number>\n",
            "        }},\n",
            "        \"summary\": <string>,\n",
            "        \"alternative\": <string>\n",
            "      }}\n\n",
            "Here is the cleaned nutrition text:\n",
            "{}"
        ),
        cleaned_text.trim()
    )
}
