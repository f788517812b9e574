use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::{IngestArgs, SourceKind};
use crate::commands::package;
use crate::model::{IngestPaths, IngestRunManifest, RunCounters, SourceReport, SourceStatus};
use crate::util::{
    ensure_directory, now_utc_string, resolve_db_path, utc_compact_string, write_json_pretty,
};

use super::db_setup::{DB_SCHEMA_VERSION, count_rows, open_store};
use super::normalize::ExerciseNormalizer;
use super::pipeline::process_source;
use super::sources::SOURCE_ORDER;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunStage {
    Source(SourceKind),
    Done,
}

impl RunStage {
    pub fn first() -> Self {
        Self::Source(SourceKind::Foundation)
    }

    pub fn next(self) -> Self {
        match self {
            Self::Source(SourceKind::Foundation) => Self::Source(SourceKind::Survey),
            Self::Source(SourceKind::Survey) => Self::Source(SourceKind::Legacy),
            Self::Source(SourceKind::Legacy) => Self::Source(SourceKind::Branded),
            Self::Source(SourceKind::Branded) => Self::Source(SourceKind::Exercises),
            Self::Source(SourceKind::Exercises) | Self::Done => Self::Done,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub source: SourceKind,
    pub path: PathBuf,
    pub selected: bool,
}

pub fn build_plan(args: &IngestArgs) -> Vec<SourcePlan> {
    let mut plan = Vec::new();
    let mut stage = RunStage::first();

    while let RunStage::Source(source) = stage {
        let override_path = match source {
            SourceKind::Foundation => args.foundation_path.as_ref(),
            SourceKind::Survey => args.survey_path.as_ref(),
            SourceKind::Legacy => args.legacy_path.as_ref(),
            SourceKind::Branded => args.branded_path.as_ref(),
            SourceKind::Exercises => args.exercises_path.as_ref(),
        };
        plan.push(SourcePlan {
            source,
            path: override_path
                .cloned()
                .unwrap_or_else(|| args.data_dir.join(source.default_filename())),
            selected: args.sources.is_empty() || args.sources.contains(&source),
        });
        stage = stage.next();
    }

    plan
}

pub fn run_sources(
    connection: &mut Connection,
    plan: &[SourcePlan],
    chunk_size: usize,
    exercise_normalizer: &ExerciseNormalizer,
) -> Vec<SourceReport> {
    let mut reports = Vec::with_capacity(plan.len());
    let mut stage = RunStage::first();

    while let RunStage::Source(source) = stage {
        stage = stage.next();

        let Some(entry) = plan.iter().find(|entry| entry.source == source) else {
            continue;
        };
        let path_display = entry.path.display().to_string();

        if !entry.selected {
            reports.push(SourceReport {
                source: source.to_string(),
                path: path_display,
                status: SourceStatus::NotSelected,
                reason: None,
                container_key: None,
                elapsed_ms: 0,
                counters: RunCounters::default(),
                failed_chunks: Vec::new(),
            });
            continue;
        }

        info!(source = %source, path = %path_display, "starting source");
        let started = Instant::now();

        let report = match process_source(
            connection,
            source,
            &entry.path,
            chunk_size,
            exercise_normalizer,
        ) {
            Ok(run) => SourceReport {
                source: source.to_string(),
                path: path_display,
                status: SourceStatus::Completed,
                reason: None,
                container_key: run.container_key,
                elapsed_ms: started.elapsed().as_millis() as u64,
                counters: run.counters,
                failed_chunks: run.failed_chunks,
            },
            Err(err) => {
                warn!(source = %source, error = %err, "source skipped");
                SourceReport {
                    source: source.to_string(),
                    path: path_display,
                    status: SourceStatus::Skipped,
                    reason: Some(err.to_string()),
                    container_key: None,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    counters: RunCounters::default(),
                    failed_chunks: Vec::new(),
                }
            }
        };

        log_source_report(&report);
        reports.push(report);
    }

    reports
}

pub fn total_counters(reports: &[SourceReport]) -> RunCounters {
    let mut totals = RunCounters::default();
    for report in reports {
        totals.absorb(report.counters);
    }
    totals
}

fn log_source_report(report: &SourceReport) {
    let c = &report.counters;
    info!(
        source = %report.source,
        status = ?report.status,
        processed = c.processed,
        valid = c.valid,
        inserted = c.inserted,
        duplicate = c.duplicate,
        skipped = c.skipped,
        errored = c.errored,
        failed_chunks = report.failed_chunks.len(),
        elapsed_ms = report.elapsed_ms,
        "source finished"
    );
}

fn expected_container_for(source: &str) -> Option<&'static str> {
    SOURCE_ORDER
        .iter()
        .find(|kind| kind.as_str() == source)
        .and_then(|kind| kind.container_key())
}

fn collect_warnings(reports: &[SourceReport]) -> Vec<String> {
    let mut warnings = Vec::new();
    for report in reports {
        if let Some(reason) = &report.reason {
            warnings.push(format!("{} skipped: {reason}", report.source));
        }
        for failure in &report.failed_chunks {
            warnings.push(format!(
                "{} chunk {} ({} records) failed: {}",
                report.source, failure.chunk_index, failure.records, failure.error
            ));
        }
        if let (Some(found), Some(expected)) = (
            report.container_key.as_deref(),
            expected_container_for(&report.source),
        ) {
            if found != expected {
                warnings.push(format!(
                    "{} records were found under {found:?}, expected {expected:?}",
                    report.source
                ));
            }
        }
    }
    warnings
}

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let report_path = args.report_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "ingest_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let db_path = resolve_db_path(&cache_root, args.db_path.as_deref());

    info!(
        run_id = %run_id,
        db_path = %db_path.display(),
        data_dir = %args.data_dir.display(),
        "starting ingest"
    );

    let mut connection = open_store(&db_path)?;
    let exercise_normalizer = ExerciseNormalizer::new()?;
    let chunk_size = args.chunk_size.max(1);
    let plan = build_plan(&args);

    let reports = run_sources(&mut connection, &plan, chunk_size, &exercise_normalizer);
    let totals = total_counters(&reports);

    let ingredient_rows = count_rows(&connection, r#"SELECT COUNT(*) FROM "Ingredient""#)?;
    let exercise_rows = count_rows(&connection, r#"SELECT COUNT(*) FROM "Exercise""#)?;
    drop(connection);

    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        chunk_size,
        paths: IngestPaths {
            cache_root: cache_root.display().to_string(),
            data_dir: args.data_dir.display().to_string(),
            db_path: db_path.display().to_string(),
            report_path: report_path.display().to_string(),
        },
        warnings: collect_warnings(&reports),
        sources: reports,
        totals,
        ingredient_rows,
        exercise_rows,
    };
    write_json_pretty(&report_path, &manifest)?;

    info!(path = %report_path.display(), "wrote ingest run report");
    info!(
        run_id = %run_id,
        processed = totals.processed,
        valid = totals.valid,
        inserted = totals.inserted,
        duplicate = totals.duplicate,
        skipped = totals.skipped,
        errored = totals.errored,
        ingredients = ingredient_rows,
        exercises = exercise_rows,
        "ingest completed"
    );

    if args.package {
        let dist_dir = cache_root.join("dist");
        package::package_store(&db_path, &dist_dir, &args.runtime_db_path)?;
    }

    Ok(())
}
