pub mod extract;
pub mod ingest;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod storage;
