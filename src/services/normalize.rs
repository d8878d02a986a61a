use std::sync::Arc;

use crate::services::llm::CompletionClient;

const SYSTEM_PROMPT: &str = "You are an OCR text cleaner.";
const MAX_TOKENS: u32 = 250;

/// Cheap LLM pass that repairs numeric OCR artifacts without altering the
/// semantic content of the label text.
pub struct TextNormalizer {
    llm: Option<Arc<dyn CompletionClient>>,
}

impl TextNormalizer {
    pub fn new(llm: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { llm }
    }

    /// Repair fused digit/unit runs and missing decimal points. Never fails:
    /// without a configured client, on transport errors, or on empty model
    /// output the input is returned unchanged.
    pub async fn clean(&self, raw_text: &str) -> String {
        let Some(llm) = &self.llm else {
            tracing::debug!("no LLM credential configured; skipping OCR cleanup");
            return raw_text.to_string();
        };

        let prompt = build_prompt(raw_text);
        match llm.complete(SYSTEM_PROMPT, &prompt, MAX_TOKENS).await {
            Ok(content) => {
                let cleaned = content.trim();
                if cleaned.is_empty() {
                    tracing::debug!("OCR cleanup returned empty content; using raw text");
                    raw_text.to_string()
                } else {
                    cleaned.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "OCR cleanup call failed; using raw text");
                raw_text.to_string()
            }
        }
    }
}

fn build_prompt(ocr_text: &str) -> String {
    format!(
        concat!(
            "You are an OCR text cleaner. Only fix numeric artifacts and insert missing ",
            "decimals/slashes in this nutrition block. ",
            "Whenever you see a group of digits longer than two digits attached to a unit ",
            "(like '644g', 'O365kcal', '1039'), assume it should be split so that the last ",
            "digit is a decimal fraction. ",
            "For example:\n",
            "  - '644g' -> '64.4 g'\n",
            "  - '314'  -> '31.4'\n",
            "  - '1039' -> '10.3'  (while preserving unit if present e.g. '10.3 g').\n",
            "Also, separate digits from units with a space (e.g. '33.7 g', not '33.7g'). ",
            "Do not alter non-numeric words.\n",
            "Return only the cleaned nutrition lines, starting from the word 'NUTRITION'. ",
            "Do not add commentary.\n\n",
            "{}"
        ),
        ocr_text.trim()
    )
}
