use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const DEFAULT_DB_FILENAME: &str = "nutrition.sqlite";

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

// Accepts bare paths as well as `sqlite:` / `file:` URLs (with or without
// `//`). Query strings such as `?mode=rwc` are dropped.
pub fn resolve_db_path(cache_root: &Path, db_path: Option<&str>) -> PathBuf {
    let Some(raw) = db_path.map(str::trim).filter(|value| !value.is_empty()) else {
        return cache_root.join(DEFAULT_DB_FILENAME);
    };

    let without_scheme = raw
        .strip_prefix("sqlite:")
        .or_else(|| raw.strip_prefix("file:"))
        .unwrap_or(raw);
    let without_slashes = without_scheme
        .strip_prefix("//")
        .unwrap_or(without_scheme);
    let without_query = without_slashes
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(without_slashes);

    PathBuf::from(without_query)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}
