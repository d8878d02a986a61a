use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Media bucket name (S3-compatible)
    pub media_bucket: String,

    /// Media storage endpoint URL
    pub media_endpoint: String,

    /// Media access key ID (S3-compatible)
    pub media_access_key: String,

    /// Media secret access key (S3-compatible)
    pub media_secret_key: String,

    /// Public base URL under which stored objects resolve. The OCR provider
    /// fetches scan images from here, so it must be reachable from outside.
    pub media_public_url: String,

    /// Replicate API token. The OCR stage cannot run without it; every scan
    /// aborts at the OCR step when unset.
    pub replicate_api_token: Option<String>,

    /// OpenAI API key. When unset the cleanup stage passes text through
    /// unchanged and extraction returns an empty record.
    pub openai_api_key: Option<String>,

    /// Chat model used for both the cleanup and extraction calls.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Capture-side resize hook: shrink uploads wider than this before
    /// storage. Unset leaves uploads byte-identical.
    pub preprocess_max_width: Option<u32>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
