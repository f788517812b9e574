use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::IngestError;
use crate::scan::{JsonCursor, ScanError, json_type_name};

use super::sources::KNOWN_CONTAINER_KEYS;

pub type RawFoodRecord = Map<String, Value>;

// Header literals of the MET table. `Actvitiy` is misspelled in the source file.
pub const ACTIVITY_HEADER: &str = "Actvitiy";
pub const CODE_HEADER: &str = "Code";
pub const MET_HEADER: &str = "MET";
pub const DESCRIPTION_HEADER: &str = "Description";

fn open_source_file(path: &Path) -> Result<File, IngestError> {
    File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => IngestError::SourceUnavailable {
            path: path.to_path_buf(),
        },
        _ => IngestError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

pub struct JsonRecordReader<R> {
    cursor: JsonCursor<R>,
    container_key: Option<String>,
    element_buf: Vec<u8>,
    index: usize,
    at_start: bool,
    finished: bool,
}

impl JsonRecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let file = open_source_file(path)?;
        Self::from_reader(BufReader::with_capacity(1 << 20, file), path)
    }
}

impl<R: BufRead> JsonRecordReader<R> {
    pub fn from_reader(reader: R, path: &Path) -> Result<Self, IngestError> {
        let unrecognized = |err: ScanError| IngestError::UnrecognizedSchema {
            path: path.to_path_buf(),
            detail: err.to_string(),
        };

        let mut cursor = JsonCursor::new(reader).map_err(unrecognized)?;
        let container_key = match cursor.skip_whitespace().map_err(unrecognized)? {
            Some(b'[') => {
                cursor.bump().map_err(unrecognized)?;
                None
            }
            Some(b'{') => match locate_known_container(&mut cursor).map_err(unrecognized)? {
                Some(key) => Some(key),
                None => {
                    return Err(IngestError::UnrecognizedSchema {
                        path: path.to_path_buf(),
                        detail: format!(
                            "no array under any of the keys {}",
                            KNOWN_CONTAINER_KEYS.join(", ")
                        ),
                    });
                }
            },
            Some(byte) => {
                return Err(IngestError::UnrecognizedSchema {
                    path: path.to_path_buf(),
                    detail: format!("top-level value starts with {:?}", byte as char),
                });
            }
            None => {
                return Err(IngestError::UnrecognizedSchema {
                    path: path.to_path_buf(),
                    detail: "file is empty".to_string(),
                });
            }
        };

        Ok(Self {
            cursor,
            container_key,
            element_buf: Vec::new(),
            index: 0,
            at_start: true,
            finished: false,
        })
    }

    pub fn container_key(&self) -> Option<&str> {
        self.container_key.as_deref()
    }

    fn advance_to_element(&mut self) -> Result<bool, ScanError> {
        let mut next = self.cursor.skip_whitespace()?;

        if !self.at_start {
            match next {
                Some(b',') => {
                    self.cursor.bump()?;
                    next = self.cursor.skip_whitespace()?;
                }
                Some(b']') => return Ok(false),
                Some(byte) => {
                    return Err(ScanError::Unexpected {
                        offset: self.cursor.offset(),
                        found: byte as char,
                        expected: "',' or ']'",
                    });
                }
                None => {
                    return Err(ScanError::Eof {
                        offset: self.cursor.offset(),
                    });
                }
            }
        }
        self.at_start = false;

        match next {
            // A trailing comma is tolerated.
            Some(b']') => Ok(false),
            Some(_) => Ok(true),
            None => Err(ScanError::Eof {
                offset: self.cursor.offset(),
            }),
        }
    }
}

impl<R: BufRead> Iterator for JsonRecordReader<R> {
    type Item = Result<RawFoodRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.advance_to_element() {
            Ok(true) => {}
            Ok(false) => {
                self.finished = true;
                return None;
            }
            Err(err) => {
                self.finished = true;
                return Some(Err(IngestError::RecordParse {
                    index: self.index,
                    message: err.to_string(),
                }));
            }
        }

        let index = self.index;
        self.index += 1;
        self.element_buf.clear();
        if let Err(err) = self.cursor.consume_value(Some(&mut self.element_buf)) {
            self.finished = true;
            return Some(Err(IngestError::RecordParse {
                index,
                message: err.to_string(),
            }));
        }

        Some(decode_element(&self.element_buf, index))
    }
}

fn decode_element(bytes: &[u8], index: usize) -> Result<RawFoodRecord, IngestError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(IngestError::RecordParse {
            index,
            message: format!("expected an object, found {}", json_type_name(&other)),
        }),
        Err(err) => Err(IngestError::RecordParse {
            index,
            message: err.to_string(),
        }),
    }
}

fn locate_known_container<R: BufRead>(
    cursor: &mut JsonCursor<R>,
) -> Result<Option<String>, ScanError> {
    cursor.expect(b'{', "'{'")?;

    loop {
        match cursor.skip_whitespace()? {
            Some(b'"') => {}
            Some(b'}') => return Ok(None),
            Some(byte) => {
                return Err(ScanError::Unexpected {
                    offset: cursor.offset(),
                    found: byte as char,
                    expected: "an object key",
                });
            }
            None => {
                return Err(ScanError::Eof {
                    offset: cursor.offset(),
                });
            }
        }

        let key = cursor.read_string()?;
        cursor.expect(b':', "':'")?;

        let holds_array = cursor.skip_whitespace()? == Some(b'[');
        if holds_array && KNOWN_CONTAINER_KEYS.contains(&key.as_str()) {
            cursor.bump()?;
            return Ok(Some(key));
        }

        cursor.consume_value(None)?;
        match cursor.skip_whitespace()? {
            Some(b',') => {
                cursor.bump()?;
            }
            Some(b'}') => return Ok(None),
            Some(byte) => {
                return Err(ScanError::Unexpected {
                    offset: cursor.offset(),
                    found: byte as char,
                    expected: "',' or '}'",
                });
            }
            None => {
                return Err(ScanError::Eof {
                    offset: cursor.offset(),
                });
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExerciseRow {
    pub line: u64,
    pub activity: Option<String>,
    pub code: Option<String>,
    pub met: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    activity: usize,
    code: usize,
    met: usize,
    description: usize,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, path: &Path) -> Result<Self, IngestError> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim_start_matches('\u{feff}').trim() == name)
                .ok_or_else(|| IngestError::UnrecognizedSchema {
                    path: path.to_path_buf(),
                    detail: format!("missing required column {name:?}"),
                })
        };

        Ok(Self {
            activity: position(ACTIVITY_HEADER)?,
            code: position(CODE_HEADER)?,
            met: position(MET_HEADER)?,
            description: position(DESCRIPTION_HEADER)?,
        })
    }
}

pub struct ExerciseCsvReader<R> {
    records: csv::StringRecordsIntoIter<R>,
    columns: ColumnMap,
    path: PathBuf,
    index: usize,
}

impl ExerciseCsvReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let file = open_source_file(path)?;
        Self::from_reader(BufReader::new(file), path)
    }
}

impl<R: Read> ExerciseCsvReader<R> {
    pub fn from_reader(reader: R, path: &Path) -> Result<Self, IngestError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|err| IngestError::UnrecognizedSchema {
                path: path.to_path_buf(),
                detail: format!("unreadable header row: {err}"),
            })?
            .clone();
        let columns = ColumnMap::from_headers(&headers, path)?;

        Ok(Self {
            records: csv_reader.into_records(),
            columns,
            path: path.to_path_buf(),
            index: 0,
        })
    }
}

impl<R: Read> Iterator for ExerciseCsvReader<R> {
    type Item = Result<RawExerciseRow, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        let index = self.index;
        self.index += 1;

        let record = match record {
            Ok(record) => record,
            Err(err) => {
                return Some(Err(IngestError::RecordParse {
                    index,
                    message: format!("{}: {err}", self.path.display()),
                }));
            }
        };

        let cell = |position: usize| record.get(position).map(ToOwned::to_owned);
        Some(Ok(RawExerciseRow {
            line: record.position().map(|pos| pos.line()).unwrap_or_default(),
            activity: cell(self.columns.activity),
            code: cell(self.columns.code),
            met: cell(self.columns.met),
            description: cell(self.columns.description),
        }))
    }
}
