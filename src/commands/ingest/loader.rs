use rusqlite::{Connection, ErrorCode, ffi};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::model::{ChunkFailure, RunCounters};
use crate::util::now_utc_string;

use super::db_setup::CanonicalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub counters: RunCounters,
    pub failure: Option<ChunkFailure>,
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

// The `exists` lookup only saves constraint churn; the unique index is what
// actually decides, so a row written concurrently by another loader between
// the lookup and the insert still comes back as `Duplicate`.
pub fn insert_unique<T: CanonicalRecord>(
    connection: &Connection,
    record: &T,
    now: &str,
) -> rusqlite::Result<InsertOutcome> {
    if T::exists(connection, record.key())? {
        return Ok(InsertOutcome::Duplicate);
    }

    match record.insert(connection, now) {
        Ok(()) => Ok(InsertOutcome::Inserted),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Duplicate),
        Err(err) => Err(err),
    }
}

// Any store error other than a key collision rolls the whole chunk back and
// reports every record in it as errored; duplicates seen before the failure
// are not counted separately.
pub fn load_chunk<T: CanonicalRecord>(
    connection: &mut Connection,
    chunk_index: usize,
    records: &[T],
) -> ChunkOutcome {
    match try_load_chunk(connection, records) {
        Ok(counters) => ChunkOutcome {
            counters,
            failure: None,
        },
        Err(err) => {
            let failure = IngestError::ChunkInsertFailure {
                chunk_index,
                message: err.to_string(),
            };
            warn!(
                table = T::TABLE,
                chunk_index,
                records = records.len(),
                error = %failure,
                "chunk insert failed; continuing with next chunk"
            );
            ChunkOutcome {
                counters: RunCounters {
                    errored: records.len() as u64,
                    ..RunCounters::default()
                },
                failure: Some(ChunkFailure {
                    chunk_index,
                    records: records.len(),
                    error: err.to_string(),
                }),
            }
        }
    }
}

fn try_load_chunk<T: CanonicalRecord>(
    connection: &mut Connection,
    records: &[T],
) -> rusqlite::Result<RunCounters> {
    let tx = connection.transaction()?;
    let now = now_utc_string();
    let mut counters = RunCounters::default();

    for record in records {
        match insert_unique(&tx, record, &now)? {
            InsertOutcome::Inserted => counters.inserted += 1,
            InsertOutcome::Duplicate => {
                debug!(table = T::TABLE, key = record.key(), "duplicate key");
                counters.duplicate += 1;
            }
        }
    }

    tx.commit()?;
    Ok(counters)
}
