pub mod ingest;
pub mod package;
pub mod probe;
pub mod status;
