//! Document ingestion pipeline with multi-format parsing

mod parser;
mod pipeline;

pub use parser::FileParser;
pub use pipeline::{IngestOutcome, IngestRequest, IngestStage, IngestionPipeline};
