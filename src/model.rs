use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub processed: u64,
    pub valid: u64,
    pub inserted: u64,
    pub duplicate: u64,
    pub skipped: u64,
    pub errored: u64,
}

impl RunCounters {
    pub fn absorb(&mut self, delta: RunCounters) {
        self.processed += delta.processed;
        self.valid += delta.valid;
        self.inserted += delta.inserted;
        self.duplicate += delta.duplicate;
        self.skipped += delta.skipped;
        self.errored += delta.errored;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    Skipped,
    NotSelected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub records: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub path: String,
    pub status: SourceStatus,
    pub reason: Option<String>,
    pub container_key: Option<String>,
    pub elapsed_ms: u64,
    pub counters: RunCounters,
    pub failed_chunks: Vec<ChunkFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPaths {
    pub cache_root: String,
    pub data_dir: String,
    pub db_path: String,
    pub report_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub chunk_size: usize,
    pub paths: IngestPaths,
    pub sources: Vec<SourceReport>,
    pub totals: RunCounters,
    pub ingredient_rows: i64,
    pub exercise_rows: i64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeEntry {
    pub path: String,
    pub size_bytes: u64,
    pub shape: String,
    pub top_level_key: Option<String>,
    pub columns: Vec<String>,
    pub schema: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub prefix_bytes: usize,
    pub max_depth: usize,
    pub file_count: usize,
    pub files: Vec<ProbeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_db_path: String,
    pub packaged_db_path: String,
    pub runtime_db_path: String,
    pub sha256: String,
    pub size_bytes: u64,
    pub ingredient_rows: i64,
    pub exercise_rows: i64,
    pub scripts: Vec<String>,
}
