use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::cli::ProbeArgs;
use crate::model::{ProbeEntry, ProbeReport};
use crate::scan::{JsonCursor, ScanError, json_type_name};
use crate::util::{now_utc_string, write_json_pretty};

const SHAPE_BARE_ARRAY: &str = "bare_array";
const SHAPE_WRAPPED_ARRAY: &str = "wrapped_array";
const SHAPE_OBJECT: &str = "object";
const SHAPE_CSV: &str = "csv";
const SHAPE_UNKNOWN: &str = "unknown";

pub fn run(args: ProbeArgs) -> Result<()> {
    let mut files = Vec::new();
    for path in &args.paths {
        files.extend(discover_files(path)?);
    }
    if files.is_empty() {
        bail!("no .json or .csv files found under the given paths");
    }

    let entries: Vec<ProbeEntry> = files
        .iter()
        .map(|path| probe_file(path, args.prefix_bytes, args.max_depth))
        .collect();

    for entry in &entries {
        match &entry.error {
            Some(error) => warn!(path = %entry.path, shape = %entry.shape, error = %error, "probe incomplete"),
            None => info!(
                path = %entry.path,
                shape = %entry.shape,
                key = entry.top_level_key.as_deref().unwrap_or("-"),
                columns = entry.columns.len(),
                "probed"
            ),
        }
    }

    let report = ProbeReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        prefix_bytes: args.prefix_bytes,
        max_depth: args.max_depth,
        file_count: entries.len(),
        files: entries,
    };

    let output = args
        .output
        .unwrap_or_else(|| args.cache_root.join("manifests").join("format_probe.json"));
    write_json_pretty(&output, &report)?;
    info!(path = %output.display(), file_count = report.file_count, "probe completed");

    Ok(())
}

fn discover_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let entries =
        fs::read_dir(path).with_context(|| format!("failed to read {}", path.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", path.display()))?;
        let candidate = entry.path();
        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", candidate.display()))?
            .is_file()
        {
            continue;
        }
        if file_kind(&candidate).is_some() {
            files.push(candidate);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum FileKind {
    Json,
    Csv,
}

fn file_kind(path: &Path) -> Option<FileKind> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    if ext.eq_ignore_ascii_case("json") {
        Some(FileKind::Json)
    } else if ext.eq_ignore_ascii_case("csv") {
        Some(FileKind::Csv)
    } else {
        None
    }
}

// Inspects the first `prefix_bytes` of a file. Never fails; problems are
// recorded on the entry and the shape is left as `unknown` when nothing
// could be determined.
fn probe_file(path: &Path, prefix_bytes: usize, max_depth: usize) -> ProbeEntry {
    let mut entry = ProbeEntry {
        path: path.display().to_string(),
        size_bytes: 0,
        shape: SHAPE_UNKNOWN.to_string(),
        top_level_key: None,
        columns: Vec::new(),
        schema: None,
        error: None,
    };

    let prefix = match read_prefix(path, prefix_bytes) {
        Ok((size, prefix)) => {
            entry.size_bytes = size;
            prefix
        }
        Err(err) => {
            entry.error = Some(format!("{err:#}"));
            return entry;
        }
    };

    match file_kind(path) {
        Some(FileKind::Csv) => probe_csv(&prefix, &mut entry),
        _ => probe_json(&prefix, max_depth, &mut entry),
    }
    entry
}

fn read_prefix(path: &Path, prefix_bytes: usize) -> Result<(u64, Vec<u8>)> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let size = file
        .metadata()
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();

    let mut prefix = Vec::with_capacity(prefix_bytes.min(size as usize));
    file.take(prefix_bytes as u64)
        .read_to_end(&mut prefix)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok((size, prefix))
}

fn probe_csv(prefix: &[u8], entry: &mut ProbeEntry) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(prefix);

    match reader.headers() {
        Ok(headers) if !headers.is_empty() => {
            entry.shape = SHAPE_CSV.to_string();
            entry.columns = headers
                .iter()
                .map(|header| header.trim_start_matches('\u{feff}').to_string())
                .collect();
        }
        Ok(_) => entry.error = Some("no header row".to_string()),
        Err(err) => entry.error = Some(format!("unreadable header row: {err}")),
    }
}

fn probe_json(prefix: &[u8], max_depth: usize, entry: &mut ProbeEntry) {
    if let Err(err) = scan_json(prefix, max_depth, entry) {
        entry.error = Some(match err {
            ScanError::Eof { .. } => format!("prefix ended before the structure did ({err})"),
            other => other.to_string(),
        });
    }
}

fn scan_json(prefix: &[u8], max_depth: usize, entry: &mut ProbeEntry) -> Result<(), ScanError> {
    let mut cursor = JsonCursor::new(prefix)?;
    match cursor.skip_whitespace()? {
        Some(b'[') => {
            entry.shape = SHAPE_BARE_ARRAY.to_string();
            cursor.bump()?;
            sample_first_element(&mut cursor, max_depth, entry)
        }
        Some(b'{') => probe_object(&mut cursor, max_depth, entry),
        Some(byte) => {
            entry.error = Some(format!("top-level value starts with {:?}", byte as char));
            Ok(())
        }
        None => {
            entry.error = Some("file is empty".to_string());
            Ok(())
        }
    }
}

fn probe_object(
    cursor: &mut JsonCursor<&[u8]>,
    max_depth: usize,
    entry: &mut ProbeEntry,
) -> Result<(), ScanError> {
    entry.shape = SHAPE_OBJECT.to_string();
    cursor.expect(b'{', "'{'")?;
    let mut fields = Map::new();

    loop {
        match cursor.skip_whitespace()? {
            Some(b'}') => break,
            Some(b',') => {
                cursor.bump()?;
                continue;
            }
            Some(_) => {}
            None => return Err(ScanError::Eof { offset: cursor.offset() }),
        }

        let key = cursor.read_string()?;
        cursor.expect(b':', "':'")?;
        entry.columns.push(key.clone());

        if cursor.skip_whitespace()? == Some(b'[') {
            entry.shape = SHAPE_WRAPPED_ARRAY.to_string();
            entry.top_level_key = Some(key);
            cursor.bump()?;
            return sample_first_element(cursor, max_depth, entry);
        }

        let mut raw = Vec::new();
        cursor.consume_value(Some(&mut raw))?;
        if let Ok(value) = serde_json::from_slice::<Value>(&raw) {
            fields.insert(key, describe_schema(&value, 1, max_depth));
        }
    }

    entry.schema = Some(Value::Object(fields));
    Ok(())
}

fn sample_first_element(
    cursor: &mut JsonCursor<&[u8]>,
    max_depth: usize,
    entry: &mut ProbeEntry,
) -> Result<(), ScanError> {
    if cursor.skip_whitespace()? == Some(b']') {
        entry.schema = Some(json!({ "type": "array", "length": 0 }));
        return Ok(());
    }

    let mut raw = Vec::new();
    cursor.consume_value(Some(&mut raw))?;
    match serde_json::from_slice::<Value>(&raw) {
        Ok(element) => entry.schema = Some(describe_schema(&element, 0, max_depth)),
        Err(err) => entry.error = Some(format!("first element does not decode: {err}")),
    }
    Ok(())
}

fn describe_schema(value: &Value, depth: usize, max_depth: usize) -> Value {
    match value {
        Value::Object(map) if depth >= max_depth => {
            Value::String(format!("object({} fields)", map.len()))
        }
        Value::Array(items) if depth >= max_depth => {
            Value::String(format!("array({})", items.len()))
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), describe_schema(child, depth + 1, max_depth)))
                .collect(),
        ),
        Value::Array(items) => json!({
            "type": "array",
            "length": items.len(),
            "element": items
                .first()
                .map(|first| describe_schema(first, depth + 1, max_depth))
                .unwrap_or(Value::Null),
        }),
        scalar => Value::String(json_type_name(scalar).to_string()),
    }
}
