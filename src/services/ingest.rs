use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::scan::{ImageFormat, StoredImage};
use crate::services::preprocess::{self, Preprocess};
use crate::services::storage::ImageStore;

/// Decoded uploads above this size are rejected before decoding.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

static DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^data:image/(png|jpe?g|gif);base64,(.+)$").unwrap());

/// Validates, decodes, and durably stores an inbound image payload.
pub struct ImageIngestor {
    store: Arc<dyn ImageStore>,
    preprocess: Option<Preprocess>,
}

impl ImageIngestor {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self {
            store,
            preprocess: None,
        }
    }

    /// Install a capture-side transform run between decode and storage.
    pub fn with_preprocess(mut self, hook: Preprocess) -> Self {
        self.preprocess = Some(hook);
        self
    }

    /// Validate a `data:image/...;base64,...` payload, reject oversized
    /// uploads from the base64 length alone, decode, and store the bytes
    /// under a collision-resistant key.
    pub async fn ingest(&self, payload: &str) -> Result<StoredImage, IngestError> {
        let caps = DATA_URI.captures(payload).ok_or(IngestError::InvalidFormat)?;
        let format: ImageFormat = caps[1].parse().map_err(|_| IngestError::InvalidFormat)?;
        let b64 = &caps[2];

        let estimated = estimated_decoded_len(b64);
        if estimated > MAX_IMAGE_BYTES {
            return Err(IngestError::TooLarge { estimated });
        }

        let mut data = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|_| IngestError::Decode)?;

        if let Some(hook) = &self.preprocess {
            match preprocess::apply(hook, &data, format) {
                Some(processed) => data = processed,
                None => {
                    tracing::warn!(format = %format, "payload did not parse as an image; storing raw bytes");
                }
            }
        }

        let key = format!(
            "scan_{}_{}.{}",
            chrono::Utc::now().timestamp(),
            &Uuid::new_v4().simple().to_string()[..8],
            format.extension()
        );

        let url = self
            .store
            .put(&key, &data, format.content_type())
            .await
            .map_err(|e| IngestError::Upload(e.to_string()))?;

        Ok(StoredImage {
            url,
            format,
            size: data.len(),
        })
    }
}

/// Decoded byte length of a base64 body, computed without decoding: three
/// bytes per four characters, minus trailing padding.
pub fn estimated_decoded_len(b64: &str) -> usize {
    let padding = b64
        .as_bytes()
        .iter()
        .rev()
        .take(2)
        .filter(|&&c| c == b'=')
        .count();
    (b64.len() * 3 / 4).saturating_sub(padding)
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid image format")]
    InvalidFormat,

    #[error("image exceeds the 5 MiB limit ({estimated} bytes)")]
    TooLarge { estimated: usize },

    #[error("base64 decode failed")]
    Decode,

    #[error("image upload failed: {0}")]
    Upload(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::StorageError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ImageStore for MemoryStore {
        async fn put(
            &self,
            key: &str,
            data: &[u8],
            _content_type: &str,
        ) -> Result<String, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), data.to_vec());
            Ok(format!("mem://{key}"))
        }
    }

    fn ingestor() -> (ImageIngestor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (ImageIngestor::new(store.clone()), store)
    }

    fn data_uri(fmt: &str, bytes: &[u8]) -> String {
        format!(
            "data:image/{fmt};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[tokio::test]
    async fn test_rejects_non_data_uri() {
        let (ingestor, _) = ingestor();
        for payload in [
            "not an image",
            "data:image/webp;base64,AAAA",
            "data:text/plain;base64,AAAA",
            "image/png;base64,AAAA",
            "",
        ] {
            let err = ingestor.ingest(payload).await.unwrap_err();
            assert!(matches!(err, IngestError::InvalidFormat), "{payload:?}");
        }
    }

    #[tokio::test]
    async fn test_accepts_uppercase_format() {
        let (ingestor, _) = ingestor();
        let payload = data_uri("JPEG", b"hello");
        let stored = ingestor.ingest(&payload).await.unwrap();
        assert_eq!(stored.format, ImageFormat::Jpeg);
        assert!(stored.url.ends_with(".jpeg"));
    }

    #[tokio::test]
    async fn test_rejects_oversized_payload_analytically() {
        let (ingestor, store) = ingestor();
        let payload = data_uri("png", &vec![0u8; MAX_IMAGE_BYTES + 1]);
        let err = ingestor.ingest(&payload).await.unwrap_err();
        assert!(matches!(err, IngestError::TooLarge { .. }));
        // Nothing reached storage.
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_base64() {
        let (ingestor, _) = ingestor();
        let err = ingestor
            .ingest("data:image/png;base64,!!!!")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_bytes() {
        let (ingestor, store) = ingestor();
        let bytes: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let stored = ingestor.ingest(&data_uri("gif", &bytes)).await.unwrap();
        assert_eq!(stored.size, bytes.len());

        let key = stored.url.strip_prefix("mem://").unwrap();
        assert_eq!(store.objects.lock().unwrap()[key], bytes);
    }

    #[test]
    fn test_size_estimate_matches_decoded_length() {
        // Cover every padding case: lengths 0..6 produce 0, 1, or 2 '='.
        for len in 0..6usize {
            let bytes = vec![0xA5u8; len];
            let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
            assert_eq!(estimated_decoded_len(&b64), len, "len={len}");
        }
        let big = vec![7u8; 4096 * 3 + 2];
        let b64 = base64::engine::general_purpose::STANDARD.encode(&big);
        assert_eq!(estimated_decoded_len(&b64), big.len());
    }

    #[tokio::test]
    async fn test_keys_do_not_collide() {
        let (ingestor, store) = ingestor();
        let payload = data_uri("png", b"same bytes");
        ingestor.ingest(&payload).await.unwrap();
        ingestor.ingest(&payload).await.unwrap();
        assert_eq!(store.objects.lock().unwrap().len(), 2);
    }
}
