use std::fs;
use std::path::Path;

use clap::Parser;
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::cli::{Cli, Commands, IngestArgs, SourceKind};
use crate::error::IngestError;
use crate::model::{IngestRunManifest, RunCounters, SourceStatus};

use super::*;
use super::classify::{DEFAULT_AISLE, DEFAULT_CATEGORY, classify_exercise, classify_food};
use super::db_setup::{CanonicalRecord, ensure_schema};
use super::loader::{InsertOutcome, insert_unique, load_chunk};
use super::normalize::{ExerciseNormalizer, FoodNormalizer, Intensity, NormalizedIngredient};
use super::nutrients::{NutrientField, NutrientTable, extract_nutrition};
use super::pipeline::drive_records;
use super::reader::{ExerciseCsvReader, JsonRecordReader, RawExerciseRow, RawFoodRecord};
use super::run::{RunStage, build_plan, run_sources, total_counters};
use super::sources::NutrientScheme;

fn store() -> Connection {
    let connection = Connection::open_in_memory().expect("open in-memory store");
    ensure_schema(&connection).expect("create schema");
    connection
}

fn food(name: &str, nutrients: Value) -> RawFoodRecord {
    match json!({ "description": name, "foodNutrients": nutrients }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn fdc(id: u32, amount: f64) -> Value {
    json!({ "nutrient": { "id": id }, "amount": amount })
}

fn foundation() -> FoodNormalizer {
    FoodNormalizer::for_source(SourceKind::Foundation).expect("foundation has a nutrient table")
}

fn read_json(text: &str) -> Result<Vec<Result<RawFoodRecord, IngestError>>, IngestError> {
    JsonRecordReader::from_reader(text.as_bytes(), Path::new("food.json"))
        .map(|reader| reader.collect())
}

fn ingest_args(extra: &[&str]) -> IngestArgs {
    let mut argv = vec!["nutriload", "ingest"];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).expect("parse ingest args").command {
        Commands::Ingest(args) => args,
        other => panic!("unexpected command: {other:?}"),
    }
}

fn load_foods(
    connection: &mut Connection,
    records: Vec<RawFoodRecord>,
    chunk_size: usize,
) -> RunCounters {
    let normalizer = foundation();
    drive_records(
        connection,
        SourceKind::Foundation,
        records.into_iter().map(Ok),
        chunk_size,
        |record: &RawFoodRecord| normalizer.normalize(record),
    )
    .counters
}

#[test]
fn kilojoules_fill_in_missing_calories() {
    let facts = extract_nutrition(
        &[fdc(1062, 418.4), fdc(1003, 3.0)],
        NutrientTable::for_scheme(NutrientScheme::Fdc),
    );
    assert_eq!(facts.calories, 100.0);
    assert_eq!(facts.protein, 3.0);

    let facts = extract_nutrition(
        &[fdc(1008, 52.0), fdc(1062, 418.4)],
        NutrientTable::for_scheme(NutrientScheme::Fdc),
    );
    assert_eq!(facts.calories, 52.0);
}

#[test]
fn repeated_nutrient_id_keeps_last_amount() {
    let facts = extract_nutrition(
        &[fdc(1003, 2.0), fdc(1003, 7.0)],
        NutrientTable::for_scheme(NutrientScheme::Fdc),
    );
    assert_eq!(facts.protein, 7.0);
}

#[test]
fn nutrient_schemes_are_never_mixed() {
    let fdc_table = NutrientTable::for_scheme(NutrientScheme::Fdc);
    let sr_table = NutrientTable::for_scheme(NutrientScheme::SrNumber);

    assert_eq!(fdc_table.field_for(1003), Some(NutrientField::Protein));
    assert_eq!(fdc_table.field_for(203), None);
    assert_eq!(sr_table.field_for(203), Some(NutrientField::Protein));
    assert_eq!(sr_table.field_for(1003), None);

    let survey_entries = [
        json!({ "nutrient": { "number": "203" }, "amount": 5.5 }),
        json!({ "nutrientNumber": 208, "amount": 120.0 }),
        fdc(1004, 9.0),
    ];
    let facts = extract_nutrition(&survey_entries, sr_table);
    assert_eq!(facts.protein, 5.5);
    assert_eq!(facts.calories, 120.0);
    assert_eq!(facts.fat, 0.0);
}

#[test]
fn record_without_macros_is_rejected() {
    let normalizer = foundation();

    let fiber_only = food("Psyllium husk", json!([fdc(1079, 80.0)]));
    assert!(matches!(
        normalizer.normalize(&fiber_only),
        Err(IngestError::RecordInvalid(_))
    ));

    let some_protein = food("Celery", json!([fdc(1003, 2.0)]));
    let ingredient = normalizer.normalize(&some_protein).expect("protein counts as a macro");
    assert_eq!(ingredient.nutrition.protein, 2.0);
    assert_eq!(ingredient.name, "celery");
    assert_eq!(ingredient.description, "Celery");
}

#[test]
fn net_carbs_never_go_negative() {
    let ingredient = foundation()
        .normalize(&food("Bran", json!([fdc(1005, 10.0), fdc(1079, 12.0)])))
        .expect("carbs present");
    assert_eq!(ingredient.net_carbs, 0.0);

    let ingredient = foundation()
        .normalize(&food("Oats", json!([fdc(1005, 66.0), fdc(1079, 10.0)])))
        .expect("carbs present");
    assert_eq!(ingredient.net_carbs, 56.0);
}

#[test]
fn name_category_and_serving_follow_coalescing_order() {
    let record = match json!({
        "foodDescription": "Whole milk",
        "brandedFoodCategory": "Candy",
        "foodCategory": { "description": "Dairy and Egg Products" },
        "foodPortions": [{ "gramWeight": 244.0 }],
        "foodNutrients": [fdc(1004, 3.3)]
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let ingredient: NormalizedIngredient = foundation().normalize(&record).expect("valid");
    assert_eq!(ingredient.name, "whole milk");
    assert_eq!(ingredient.category, "Dairy");
    assert_eq!(ingredient.aisle, "Dairy & Eggs");
    assert_eq!(ingredient.serving_size, "244 g");

    let mut branded = food("Gummy bears", json!([fdc(1008, 340.0)]));
    branded.insert("brandedFoodCategory".into(), json!("Candy"));
    branded.insert("servingSize".into(), json!(28));
    branded.insert("servingSizeUnit".into(), json!("g"));
    let ingredient = foundation().normalize(&branded).expect("valid");
    assert_eq!(ingredient.category, "Sweets");
    assert_eq!(ingredient.serving_size, "28 g");

    let unnamed = match json!({ "foodNutrients": [fdc(1008, 10.0)] }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let ingredient = foundation().normalize(&unnamed).expect("valid");
    assert_eq!(ingredient.name, "unknown food");
    assert_eq!(ingredient.serving_size, "100 g");
    assert_eq!(ingredient.category, DEFAULT_CATEGORY);
}

#[test]
fn unknown_category_lands_in_default_bucket() {
    let classification = classify_food(Some("Exotic Category XYZ"));
    assert_eq!(classification.category, DEFAULT_CATEGORY);
    assert_eq!(classification.aisle, DEFAULT_AISLE);
    assert_eq!(classify_food(None), classification);
    assert_eq!(classify_food(Some("   ")), classification);

    assert_eq!(classify_food(Some("Fruits and Fruit Juices")).category, "Fruits");
    assert_eq!(classify_food(Some("Chocolate chip cookies")).category, "Sweets");
    assert_eq!(classify_exercise("bicycling, mountain"), "Cycling");
    assert_eq!(classify_exercise("juggling"), "Other");
}

#[test]
fn intensity_boundaries() {
    assert_eq!(Intensity::from_met(2.9), Intensity::Light);
    assert_eq!(Intensity::from_met(3.0), Intensity::Moderate);
    assert_eq!(Intensity::from_met(5.9), Intensity::Moderate);
    assert_eq!(Intensity::from_met(6.0), Intensity::Vigorous);
    assert_eq!(Intensity::Vigorous.as_str(), "VIGOROUS");
}

#[test]
fn derived_exercise_code_is_an_uppercase_slug() {
    let normalizer = ExerciseNormalizer::new().expect("regex compiles");
    assert_eq!(
        normalizer.derive_code("  Bicycling, mountain (uphill) "),
        "BICYCLING_MOUNTAIN_UPHILL"
    );
    assert_eq!(normalizer.derive_code("!!!"), "");
    assert!(normalizer.derive_code(&"a ".repeat(100)).len() <= 64);
}

#[test]
fn exercise_rows_missing_cells_are_skipped() {
    let csv = "\u{feff}Actvitiy,Code,MET,Description\n\
               \"bicycling, mountain\",01010,8.5,uphill\n\
               walking the dog,,3.0,walking\n\
               running,12150,,no met\n\
               short row\n\
               sitting,07010,1.0,quietly\n";
    let normalizer = ExerciseNormalizer::new().expect("regex compiles");
    let reader = ExerciseCsvReader::from_reader(csv.as_bytes(), Path::new("met.csv"))
        .expect("headers recognised");

    let mut connection = store();
    let run = drive_records(
        &mut connection,
        SourceKind::Exercises,
        reader,
        100,
        |row: &RawExerciseRow| normalizer.normalize(row),
    );
    assert_eq!(run.counters.processed, 5);
    assert_eq!(run.counters.skipped, 2);
    assert_eq!(run.counters.inserted, 3);

    let (code, intensity): (String, String) = connection
        .query_row(
            r#"SELECT code, intensity FROM "Exercise" WHERE activity = 'walking the dog'"#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("walking row stored");
    assert_eq!(code, "WALKING_THE_DOG");
    assert_eq!(intensity, "MODERATE");

    let light: i64 = connection
        .query_row(
            r#"SELECT COUNT(*) FROM "Exercise" WHERE intensity = 'LIGHT'"#,
            [],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(light, 1);
}

#[test]
fn csv_without_required_header_is_unrecognized() {
    let csv = "Activity,Code,MET,Description\nwalking,1,3.0,x\n";
    assert!(matches!(
        ExerciseCsvReader::from_reader(csv.as_bytes(), Path::new("met.csv")),
        Err(IngestError::UnrecognizedSchema { .. })
    ));
}

#[test]
fn reader_accepts_wrapped_and_bare_arrays() {
    let wrapped = r#"{"FoundationFoods": [{"description": "a"}, {"description": "b"},]}"#;
    let reader = JsonRecordReader::from_reader(wrapped.as_bytes(), Path::new("f.json"))
        .expect("wrapped array");
    assert_eq!(reader.container_key(), Some("FoundationFoods"));
    assert_eq!(reader.filter(Result::is_ok).count(), 2);

    let leading = r#"{"meta": {"rows": [1, 2, "]"]}, "SRLegacyFoods": [{"description": "c"}]}"#;
    let reader = JsonRecordReader::from_reader(leading.as_bytes(), Path::new("f.json"))
        .expect("known key after unknown one");
    assert_eq!(reader.container_key(), Some("SRLegacyFoods"));
    assert_eq!(reader.count(), 1);

    let bare = read_json(r#"  [{"description": "x"}, {"description": "y"}]"#).expect("bare array");
    assert_eq!(bare.len(), 2);
    assert!(bare.iter().all(Result::is_ok));
}

#[test]
fn malformed_element_does_not_stop_the_stream() {
    let items = read_json(
        r#"[{"description": "a"}, {"description": tru}, 7, {"description": "{not a brace"}]"#,
    )
    .expect("bare array");
    assert_eq!(items.len(), 4);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(IngestError::RecordParse { index: 1, .. })));
    assert!(matches!(items[2], Err(IngestError::RecordParse { index: 2, .. })));
    let last = items[3].as_ref().expect("string braces are not structure");
    assert_eq!(last.get("description"), Some(&json!("{not a brace")));
}

#[test]
fn truncated_array_ends_with_one_error() {
    let items = read_json(r#"[{"description": "a"}, {"description": "#).expect("bare array");
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(IngestError::RecordParse { .. })));
}

#[test]
fn unrecognized_shapes_fail_the_source() {
    for text in [r#"{"OtherFoods": []}"#, r#""just a string""#, "", r#"{"FoundationFoods": 3}"#] {
        assert!(
            matches!(read_json(text), Err(IngestError::UnrecognizedSchema { .. })),
            "{text:?} should be unrecognized"
        );
    }

    let missing = JsonRecordReader::open(Path::new("/nonexistent/foundation_food.json"));
    assert!(matches!(missing, Err(IngestError::SourceUnavailable { .. })));
}

#[test]
fn duplicates_within_a_chunk_are_counted_once() {
    let mut connection = store();
    let counters = load_foods(
        &mut connection,
        vec![
            food("Apple", json!([fdc(1008, 52.0)])),
            food("apple", json!([fdc(1008, 60.0)])),
            food("Pear", json!([fdc(1008, 57.0)])),
        ],
        100,
    );
    assert_eq!(counters.inserted, 2);
    assert_eq!(counters.duplicate, 1);

    let calories: f64 = connection
        .query_row(
            r#"SELECT calories FROM "Ingredient" WHERE name = 'apple'"#,
            [],
            |row| row.get(0),
        )
        .expect("apple stored");
    assert_eq!(calories, 52.0);
}

#[test]
fn rerun_inserts_nothing_new() {
    let mut connection = store();
    let records: Vec<RawFoodRecord> = (0..25)
        .map(|i| food(&format!("Food {i}"), json!([fdc(1003, 1.0)])))
        .collect();

    let first = load_foods(&mut connection, records.clone(), 10);
    assert_eq!(first.inserted, 25);

    let second = load_foods(&mut connection, records, 10);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicate, first.inserted);
}

#[test]
fn failing_chunk_is_rolled_back_alone() {
    let mut connection = store();
    let mut records = Vec::new();
    for chunk in 0..100 {
        for slot in 0..100 {
            let name = if chunk == 42 && slot == 7 {
                "x".repeat(200)
            } else {
                format!("food {chunk}-{slot}")
            };
            records.push(food(&name, json!([fdc(1004, 1.0)])));
        }
    }

    let normalizer = foundation();
    let run = drive_records(
        &mut connection,
        SourceKind::Foundation,
        records.into_iter().map(Ok),
        100,
        |record: &RawFoodRecord| normalizer.normalize(record),
    );
    assert_eq!(run.counters.processed, 10_000);
    assert_eq!(run.counters.inserted, 9_900);
    assert_eq!(run.counters.errored, 100);
    assert_eq!(run.failed_chunks.len(), 1);
    assert_eq!(run.failed_chunks[0].chunk_index, 42);

    let stored = count_rows(&connection, r#"SELECT COUNT(*) FROM "Ingredient""#).expect("count");
    assert_eq!(stored, 9_900);
}

#[test]
fn parse_errors_are_counted_not_raised() {
    let mut connection = store();
    let normalizer = foundation();
    let records = vec![
        Ok(food("Rice", json!([fdc(1005, 28.0)]))),
        Err(IngestError::RecordParse {
            index: 1,
            message: "broken".to_string(),
        }),
        Ok(food("Water", json!([]))),
    ];
    let run = drive_records(
        &mut connection,
        SourceKind::Foundation,
        records.into_iter(),
        100,
        |record: &RawFoodRecord| normalizer.normalize(record),
    );
    assert_eq!(
        run.counters,
        RunCounters {
            processed: 3,
            valid: 1,
            inserted: 1,
            duplicate: 0,
            skipped: 1,
            errored: 1,
        }
    );
}

#[test]
fn stages_walk_sources_in_fixed_order() {
    let mut stage = RunStage::first();
    let mut seen = Vec::new();
    while let RunStage::Source(source) = stage {
        seen.push(source);
        stage = stage.next();
    }
    assert_eq!(
        seen,
        vec![
            SourceKind::Foundation,
            SourceKind::Survey,
            SourceKind::Legacy,
            SourceKind::Branded,
            SourceKind::Exercises,
        ]
    );
    assert_eq!(RunStage::Done.next(), RunStage::Done);
}

#[test]
fn plan_honours_selection_and_path_overrides() {
    let args = ingest_args(&[
        "--data-dir",
        "/data",
        "--source",
        "exercises",
        "--source",
        "foundation",
        "--exercises-path",
        "/elsewhere/met.csv",
    ]);
    let plan = build_plan(&args);
    assert_eq!(plan.len(), 5);
    assert_eq!(plan[0].source, SourceKind::Foundation);
    assert!(plan[0].selected);
    assert_eq!(plan[0].path, Path::new("/data/foundation_food.json"));
    assert!(!plan[1].selected);
    assert_eq!(plan[4].path, Path::new("/elsewhere/met.csv"));
    assert!(plan[4].selected);

    let all = build_plan(&ingest_args(&[]));
    assert!(all.iter().all(|entry| entry.selected));
}

#[test]
fn missing_source_is_skipped_and_run_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("foundation_food.json"),
        r#"{"FoundationFoods": [
            {"description": "Hummus", "foodCategory": {"description": "Legumes and Legume Products"},
             "foodNutrients": [{"nutrient": {"id": 1008}, "amount": 166}]}
        ]}"#,
    )
    .expect("write foundation");
    fs::write(
        dir.path().join("met_values.csv"),
        "Actvitiy,Code,MET,Description\nrunning,12150,8.0,general\n",
    )
    .expect("write met table");
    fs::write(dir.path().join("sr_legacy_food.json"), r#"{"Nope": []}"#).expect("write legacy");

    let data_dir = dir.path().to_string_lossy().to_string();
    let args = ingest_args(&["--data-dir", &data_dir]);
    let plan = build_plan(&args);

    let mut connection = store();
    let normalizer = ExerciseNormalizer::new().expect("regex compiles");
    let reports = run_sources(&mut connection, &plan, 100, &normalizer);

    let statuses: Vec<SourceStatus> = reports.iter().map(|report| report.status).collect();
    assert_eq!(
        statuses,
        vec![
            SourceStatus::Completed,
            SourceStatus::Skipped,
            SourceStatus::Skipped,
            SourceStatus::Skipped,
            SourceStatus::Completed,
        ]
    );
    assert!(
        reports[1]
            .reason
            .as_deref()
            .is_some_and(|reason| reason.contains("not found"))
    );
    assert_eq!(reports[0].container_key.as_deref(), Some("FoundationFoods"));

    let totals = total_counters(&reports);
    assert_eq!(totals.inserted, 2);
    assert_eq!(totals.processed, 2);

    let aisle: String = connection
        .query_row(
            r#"SELECT aisle FROM "Ingredient" WHERE name = 'hummus'"#,
            [],
            |row| row.get(0),
        )
        .expect("hummus stored");
    assert_eq!(aisle, "Canned & Dry Goods");
}

#[test]
fn nutrient_number_is_the_last_id_fallback() {
    let mut connection = store();
    let counters = load_foods(
        &mut connection,
        vec![food(
            "Lentils",
            json!([{ "nutrient": { "number": 1003 }, "amount": 9.0 }]),
        )],
        100,
    );
    assert_eq!(counters.inserted, 1);

    let protein: f64 = connection
        .query_row(
            r#"SELECT protein FROM "Ingredient" WHERE name = 'lentils'"#,
            [],
            |row| row.get(0),
        )
        .expect("lentils stored");
    assert_eq!(protein, 9.0);

    let facts = extract_nutrition(
        &[json!({ "nutrient": { "id": 1004, "number": 1003 }, "amount": 2.0 })],
        NutrientTable::for_scheme(NutrientScheme::Fdc),
    );
    assert_eq!(facts.fat, 2.0);
    assert_eq!(facts.protein, 0.0);
}

// Skips the lookup, as if another writer committed the key right after it ran.
struct UncheckedIngredient(NormalizedIngredient);

impl CanonicalRecord for UncheckedIngredient {
    const TABLE: &'static str = <NormalizedIngredient as CanonicalRecord>::TABLE;

    fn key(&self) -> &str {
        self.0.key()
    }

    fn exists(_connection: &Connection, _key: &str) -> rusqlite::Result<bool> {
        Ok(false)
    }

    fn insert(&self, connection: &Connection, now: &str) -> rusqlite::Result<()> {
        self.0.insert(connection, now)
    }
}

#[test]
fn unique_index_turns_a_late_collision_into_a_duplicate() {
    let mut connection = store();
    let apple = || {
        UncheckedIngredient(
            foundation()
                .normalize(&food("Apple", json!([fdc(1008, 52.0)])))
                .expect("apple normalizes"),
        )
    };

    let first = insert_unique(&connection, &apple(), "now").expect("first insert");
    assert_eq!(first, InsertOutcome::Inserted);
    let second = insert_unique(&connection, &apple(), "now").expect("colliding insert");
    assert_eq!(second, InsertOutcome::Duplicate);

    let chunk = load_chunk(&mut connection, 0, &[apple(), apple()]);
    assert!(chunk.failure.is_none());
    assert_eq!(chunk.counters.inserted, 0);
    assert_eq!(chunk.counters.duplicate, 2);
    assert_eq!(chunk.counters.errored, 0);

    let stored = count_rows(&connection, r#"SELECT COUNT(*) FROM "Ingredient""#).expect("count");
    assert_eq!(stored, 1);
}

#[test]
fn run_writes_report_and_survives_skipped_sources() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).expect("create data dir");
    let long_name = "x".repeat(200);
    fs::write(
        data_dir.join("foundation_food.json"),
        format!(
            r#"{{"SurveyFoods": [
                {{"description": "Oats", "foodNutrients": [{{"nutrient": {{"id": 1003}}, "amount": 13}}]}},
                {{"description": "{long_name}", "foodNutrients": [{{"nutrient": {{"id": 1003}}, "amount": 1}}]}}
            ]}}"#
        ),
    )
    .expect("write foundation");

    let cache_root = dir.path().join("cache");
    let db_path = dir.path().join("store.sqlite");
    let cache_arg = cache_root.to_string_lossy().to_string();
    let data_arg = data_dir.to_string_lossy().to_string();
    let db_arg = db_path.to_string_lossy().to_string();
    let args = ingest_args(&[
        "--cache-root",
        &cache_arg,
        "--data-dir",
        &data_arg,
        "--db-path",
        &db_arg,
        "--chunk-size",
        "1",
    ]);

    run(args).expect("run completes with skipped sources");

    let manifest_dir = cache_root.join("manifests");
    let report_path = fs::read_dir(&manifest_dir)
        .expect("manifest dir")
        .map(|entry| entry.expect("manifest entry").path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("ingest_run_") && name.ends_with(".json"))
        })
        .expect("run report written");
    let report: IngestRunManifest =
        serde_json::from_str(&fs::read_to_string(&report_path).expect("read report"))
            .expect("parse report");

    assert_eq!(report.sources.len(), 5);
    let loaded = &report.sources[0];
    assert_eq!(loaded.status, SourceStatus::Completed);
    assert_eq!(loaded.container_key.as_deref(), Some("SurveyFoods"));
    assert_eq!(loaded.counters.inserted, 1);
    assert_eq!(loaded.counters.errored, 1);
    assert_eq!(loaded.failed_chunks.len(), 1);
    assert_eq!(loaded.failed_chunks[0].chunk_index, 1);
    assert!(
        report.sources[1..]
            .iter()
            .all(|source| source.status == SourceStatus::Skipped)
    );
    assert_eq!(report.ingredient_rows, 1);
    assert_eq!(report.totals.inserted, 1);

    let has_warning = |needle: &str| report.warnings.iter().any(|w| w.contains(needle));
    assert!(has_warning(r#"expected "FoundationFoods""#));
    assert!(has_warning("foundation chunk 1 (1 records) failed"));
    assert!(has_warning("exercises skipped"));
}
