use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use crate::models::nutrition::{NutrientLevel, NutritionFacts};

/// Image formats accepted in the upload data URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// File extension used for the stored object key.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpg | ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// Encoder target when re-encoding after the preprocess hook.
    pub fn encode_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpg | ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Gif => image::ImageFormat::Gif,
        }
    }
}

/// A validated, durably stored scan image.
#[derive(Debug, Clone)]
pub struct StoredImage {
    /// Publicly resolvable URL of the stored bytes.
    pub url: String,
    pub format: ImageFormat,
    /// Decoded size in bytes.
    pub size: usize,
}

/// Structured output of one scan: the pipeline's contract with its callers.
///
/// All eight nutrition keys are always present in the serialized form, with
/// `null` for anything the extraction could not read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    pub product_name: Option<String>,
    /// ISO-8601 date (`YYYY-MM-DD`) when a best-before date was visible.
    pub expiry_date: Option<String>,
    /// Risk annotations in the order produced (e.g. "High Sugar").
    pub flags: Vec<String>,
    pub nutrition: NutritionFacts,
    pub summary: String,
    pub alternative: String,
}

/// A persisted scan as stored in `nutrition_scans`.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRow {
    pub id: i64,
    /// Owning user; 0 for anonymous scans.
    pub user_id: i64,
    pub image_url: String,
    /// Serialized [`NutritionRecord`].
    pub record: serde_json::Value,
    /// Comma-joined flag list, denormalized for filtering.
    pub flags: String,
    pub created_at: DateTime<Utc>,
}

/// Request to scan a nutrition label image.
#[derive(Debug, Deserialize, Validate)]
pub struct ScanRequest {
    /// `data:image/<fmt>;base64,<payload>` upload.
    #[garde(length(min = 1))]
    pub image: String,

    #[garde(skip)]
    pub user_id: Option<i64>,
}

/// Response after a completed scan.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub scan_id: i64,
    pub image_url: String,
    pub record: NutritionRecord,
    /// Traffic-light level per readable nutrient.
    pub levels: BTreeMap<&'static str, NutrientLevel>,
}

/// Generic error body for aborted scans.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
