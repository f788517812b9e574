use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source file not found: {}", .path.display())]
    SourceUnavailable { path: PathBuf },

    #[error("unrecognized source shape in {}: {detail}", .path.display())]
    UnrecognizedSchema { path: PathBuf, detail: String },

    #[error("malformed record #{index}: {message}")]
    RecordParse { index: usize, message: String },

    #[error("record rejected: {0}")]
    RecordInvalid(String),

    #[error("chunk {chunk_index} insert failed: {message}")]
    ChunkInsertFailure { chunk_index: usize, message: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
