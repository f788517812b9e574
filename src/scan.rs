use std::io::{self, BufRead};

use serde_json::Value;
use thiserror::Error;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("i/o error at byte {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("unexpected end of input at byte {offset}")]
    Eof { offset: u64 },

    #[error("unexpected byte {found:?} at byte {offset}, expected {expected}")]
    Unexpected {
        offset: u64,
        found: char,
        expected: &'static str,
    },

    #[error("invalid string literal at byte {offset}: {message}")]
    BadString { offset: u64, message: String },
}

#[derive(Debug, Default, Clone)]
pub struct BraceScanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BraceScanner {
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return false;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' if self.depth > 0 => {
                self.depth -= 1;
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }
}

pub struct JsonCursor<R> {
    reader: R,
    offset: u64,
}

impl<R: BufRead> JsonCursor<R> {
    pub fn new(mut reader: R) -> Result<Self, ScanError> {
        let has_bom = reader
            .fill_buf()
            .map_err(|source| ScanError::Io { offset: 0, source })?
            .starts_with(&UTF8_BOM);
        let mut offset = 0;
        if has_bom {
            reader.consume(UTF8_BOM.len());
            offset = UTF8_BOM.len() as u64;
        }
        Ok(Self { reader, offset })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn peek(&mut self) -> Result<Option<u8>, ScanError> {
        let offset = self.offset;
        let buf = self
            .reader
            .fill_buf()
            .map_err(|source| ScanError::Io { offset, source })?;
        Ok(buf.first().copied())
    }

    pub fn bump(&mut self) -> Result<Option<u8>, ScanError> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.reader.consume(1);
            self.offset += 1;
        }
        Ok(byte)
    }

    pub fn skip_whitespace(&mut self) -> Result<Option<u8>, ScanError> {
        loop {
            match self.peek()? {
                Some(byte) if byte.is_ascii_whitespace() => {
                    self.bump()?;
                }
                other => return Ok(other),
            }
        }
    }

    pub fn expect(&mut self, wanted: u8, expected: &'static str) -> Result<(), ScanError> {
        match self.skip_whitespace()? {
            Some(byte) if byte == wanted => {
                self.bump()?;
                Ok(())
            }
            Some(byte) => Err(ScanError::Unexpected {
                offset: self.offset,
                found: byte as char,
                expected,
            }),
            None => Err(ScanError::Eof {
                offset: self.offset,
            }),
        }
    }

    pub fn read_string(&mut self) -> Result<String, ScanError> {
        let start = self.offset;
        let mut raw = Vec::new();
        self.consume_value(Some(&mut raw))?;
        if raw.first() != Some(&b'"') {
            return Err(ScanError::BadString {
                offset: start,
                message: "not a string".to_string(),
            });
        }
        serde_json::from_slice(&raw).map_err(|err| ScanError::BadString {
            offset: start,
            message: err.to_string(),
        })
    }

    pub fn consume_value(&mut self, mut out: Option<&mut Vec<u8>>) -> Result<(), ScanError> {
        let first = self.skip_whitespace()?.ok_or(ScanError::Eof {
            offset: self.offset,
        })?;

        match first {
            b'{' | b'[' => {
                let mut scanner = BraceScanner::default();
                loop {
                    let byte = self.bump()?.ok_or(ScanError::Eof {
                        offset: self.offset,
                    })?;
                    if let Some(buf) = out.as_deref_mut() {
                        buf.push(byte);
                    }
                    if scanner.feed(byte) {
                        return Ok(());
                    }
                }
            }
            b'"' => {
                let mut escaped = false;
                self.bump()?;
                if let Some(buf) = out.as_deref_mut() {
                    buf.push(b'"');
                }
                loop {
                    let byte = self.bump()?.ok_or(ScanError::Eof {
                        offset: self.offset,
                    })?;
                    if let Some(buf) = out.as_deref_mut() {
                        buf.push(byte);
                    }
                    if escaped {
                        escaped = false;
                    } else if byte == b'\\' {
                        escaped = true;
                    } else if byte == b'"' {
                        return Ok(());
                    }
                }
            }
            b'}' | b']' | b',' | b':' => Err(ScanError::Unexpected {
                offset: self.offset,
                found: first as char,
                expected: "a JSON value",
            }),
            _ => {
                while let Some(byte) = self.peek()? {
                    if matches!(byte, b',' | b'}' | b']') || byte.is_ascii_whitespace() {
                        break;
                    }
                    if let Some(buf) = out.as_deref_mut() {
                        buf.push(byte);
                    }
                    self.bump()?;
                }
                Ok(())
            }
        }
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
