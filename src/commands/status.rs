use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::ingest::{DB_SCHEMA_VERSION, count_rows, schema_version};
use crate::model::IngestRunManifest;
use crate::util::resolve_db_path;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.cache_root.join("manifests");
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());

    info!(cache_root = %args.cache_root.display(), "status requested");

    match latest_run_report(&manifest_dir)? {
        Some(path) => {
            let raw =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let report: IngestRunManifest = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;

            info!(
                path = %path.display(),
                run_id = %report.run_id,
                status = %report.status,
                started_at = %report.started_at,
                updated_at = %report.updated_at,
                processed = report.totals.processed,
                inserted = report.totals.inserted,
                duplicate = report.totals.duplicate,
                skipped = report.totals.skipped,
                errored = report.totals.errored,
                warnings = report.warnings.len(),
                "loaded latest ingest report"
            );
            for source in &report.sources {
                info!(
                    source = %source.source,
                    status = ?source.status,
                    inserted = source.counters.inserted,
                    duplicate = source.counters.duplicate,
                    "source outcome"
                );
            }
        }
        None => warn!(path = %manifest_dir.display(), "no ingest report found"),
    }

    if db_path.exists() {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let ingredients =
            count_rows(&conn, r#"SELECT COUNT(*) FROM "Ingredient""#).unwrap_or(0);
        let exercises = count_rows(&conn, r#"SELECT COUNT(*) FROM "Exercise""#).unwrap_or(0);
        let version = schema_version(&conn).unwrap_or_default();
        if version != DB_SCHEMA_VERSION {
            warn!(
                found = %version,
                expected = DB_SCHEMA_VERSION,
                "store schema version differs from this build"
            );
        }

        info!(
            path = %db_path.display(),
            schema_version = %version,
            ingredients,
            exercises,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

// Newest `ingest_run_*.json` by name; the timestamp suffix sorts chronologically.
fn latest_run_report(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.is_dir() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;
    let mut latest: Option<PathBuf> = None;
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();
        let is_report = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("ingest_run_") && name.ends_with(".json"));
        if is_report && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_report_is_picked_by_timestamp_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(latest_run_report(&dir.path().join("absent")).expect("scan"), None);

        for name in [
            "ingest_run_20250101T000000Z.json",
            "ingest_run_20250301T120000Z.json",
            "format_probe.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write fixture");
        }

        let latest = latest_run_report(dir.path()).expect("scan");
        assert_eq!(
            latest,
            Some(dir.path().join("ingest_run_20250301T120000Z.json"))
        );
    }
}
