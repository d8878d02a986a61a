use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::scan::NutritionRecord;
use crate::services::extract::NutritionExtractor;
use crate::services::ingest::{ImageIngestor, IngestError};
use crate::services::normalize::TextNormalizer;
use crate::services::ocr::{OcrError, TextExtractor};

/// A scan that reached `Done`: the stored image reference plus the record
/// the persistence collaborator writes.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub image_url: String,
    pub record: NutritionRecord,
}

/// Orchestrates one scan: ingest, OCR, numeric cleanup, extraction.
///
/// Ingestion and OCR failures abort the scan and surface as [`ScanError`];
/// the two LLM stages never abort, they degrade in place and the pipeline
/// still completes. The pipeline performs no persistence itself.
pub struct ScanPipeline {
    ingestor: ImageIngestor,
    ocr: Arc<dyn TextExtractor>,
    normalizer: TextNormalizer,
    extractor: NutritionExtractor,
}

impl ScanPipeline {
    pub fn new(
        ingestor: ImageIngestor,
        ocr: Arc<dyn TextExtractor>,
        normalizer: TextNormalizer,
        extractor: NutritionExtractor,
    ) -> Self {
        Self {
            ingestor,
            ocr,
            normalizer,
            extractor,
        }
    }

    /// Run the full scan for one `data:image/...` payload. Cancelling the
    /// token aborts the OCR poll loop early.
    pub async fn run(
        &self,
        payload: &str,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        tracing::debug!(stage = "ingesting", "scan started");
        let stored = self.ingestor.ingest(payload).await?;
        tracing::info!(
            stage = "ocr_running",
            url = %stored.url,
            format = %stored.format,
            size = stored.size,
            "image stored"
        );

        let ocr_text = self.ocr.extract_text(&stored.url, cancel).await?;
        tracing::debug!(stage = "normalizing", chars = ocr_text.len(), "OCR text extracted");

        let cleaned = self.normalizer.clean(&ocr_text).await;
        tracing::debug!(stage = "extracting", chars = cleaned.len(), "text normalized");

        let record = self.extractor.extract(&cleaned).await;
        tracing::info!(
            stage = "done",
            flags = record.flags.len(),
            has_expiry = record.expiry_date.is_some(),
            "scan complete"
        );

        Ok(ScanOutcome {
            image_url: stored.url,
            record,
        })
    }
}

/// Abort causes: everything up to and including OCR is fatal to the request.
/// Normalization and extraction failures are absent here because they never
/// propagate.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Ocr(#[from] OcrError),
}
