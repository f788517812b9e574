use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::cli::SourceKind;
use crate::error::IngestError;
use crate::model::{ChunkFailure, RunCounters};

use super::db_setup::CanonicalRecord;
use super::loader::load_chunk;
use super::normalize::{ExerciseNormalizer, FoodNormalizer};
use super::reader::{ExerciseCsvReader, JsonRecordReader};
use super::sources::SourceFormat;

const PROGRESS_EVERY: u64 = 50_000;

#[derive(Debug, Clone, Default)]
pub struct SourceRun {
    pub counters: RunCounters,
    pub failed_chunks: Vec<ChunkFailure>,
    pub container_key: Option<String>,
}

pub fn process_source(
    connection: &mut Connection,
    source: SourceKind,
    path: &Path,
    chunk_size: usize,
    exercise_normalizer: &ExerciseNormalizer,
) -> Result<SourceRun, IngestError> {
    match source.format() {
        SourceFormat::Json => {
            let normalizer =
                FoodNormalizer::for_source(source).ok_or_else(|| IngestError::UnrecognizedSchema {
                    path: path.to_path_buf(),
                    detail: format!("{source} has no nutrient vocabulary"),
                })?;
            let reader = JsonRecordReader::open(path)?;
            let container_key = reader.container_key().map(ToOwned::to_owned);
            info!(
                source = %source,
                path = %path.display(),
                container = container_key.as_deref().unwrap_or("<bare array>"),
                "streaming food records"
            );

            let mut run = drive_records(connection, source, reader, chunk_size, |record| {
                normalizer.normalize(record)
            });
            run.container_key = container_key;
            Ok(run)
        }
        SourceFormat::Csv => {
            let reader = ExerciseCsvReader::open(path)?;
            info!(source = %source, path = %path.display(), "reading exercise rows");

            Ok(drive_records(connection, source, reader, chunk_size, |row| {
                exercise_normalizer.normalize(row)
            }))
        }
    }
}

pub fn drive_records<I, Raw, T, F>(
    connection: &mut Connection,
    source: SourceKind,
    records: I,
    chunk_size: usize,
    mut normalize: F,
) -> SourceRun
where
    I: Iterator<Item = Result<Raw, IngestError>>,
    T: CanonicalRecord,
    F: FnMut(&Raw) -> Result<T, IngestError>,
{
    let chunk_size = chunk_size.max(1);
    let mut run = SourceRun::default();
    let mut pending: Vec<T> = Vec::with_capacity(chunk_size);
    let mut chunk_index = 0_usize;

    for raw in records {
        run.counters.processed += 1;

        match raw.and_then(|raw| normalize(&raw)) {
            Ok(record) => {
                run.counters.valid += 1;
                pending.push(record);
            }
            Err(IngestError::RecordInvalid(reason)) => {
                run.counters.skipped += 1;
                debug!(source = %source, reason = %reason, "record skipped");
            }
            Err(err) => {
                run.counters.errored += 1;
                warn!(source = %source, error = %err, "record could not be parsed");
            }
        }

        if pending.len() >= chunk_size {
            flush_chunk(connection, &mut pending, chunk_index, &mut run);
            chunk_index += 1;
        }

        if run.counters.processed % PROGRESS_EVERY == 0 {
            info!(
                source = %source,
                processed = run.counters.processed,
                inserted = run.counters.inserted,
                duplicate = run.counters.duplicate,
                "progress"
            );
        }
    }

    if !pending.is_empty() {
        flush_chunk(connection, &mut pending, chunk_index, &mut run);
    }

    run
}

fn flush_chunk<T: CanonicalRecord>(
    connection: &mut Connection,
    pending: &mut Vec<T>,
    chunk_index: usize,
    run: &mut SourceRun,
) {
    let outcome = load_chunk(connection, chunk_index, pending);
    run.counters.absorb(outcome.counters);
    if let Some(failure) = outcome.failure {
        run.failed_chunks.push(failure);
    }
    pending.clear();
}
