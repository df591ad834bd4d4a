//! Safe decoder for binary terms (external term format, version 131)
//!
//! Decodes the data-only subset of the format into a `serde_json::Value`.
//! Atoms are never created from input: `true`, `false` and `nil` map to JSON
//! literals and every other atom must already be in the caller's known set.
//! Compressed terms, pids, ports, references and funs are refused.
//!
//! | term | JSON |
//! |---|---|
//! | integer, small/large big (fits i64/u64) | number |
//! | new float | number |
//! | atom | string, `true`, `false`, `null` |
//! | binary | string (UTF-8) or array of bytes |
//! | string (charlist) | array of integers |
//! | list, nil, tuple | array |
//! | map with atom or binary keys | object |

use crate::error::SanitizeError;
use serde_json::{Map, Number, Value};
use std::collections::HashSet;

/// Version byte that starts every encoded term.
pub const VERSION: u8 = 131;

const NEW_FLOAT_EXT: u8 = 70;
const COMPRESSED: u8 = 80;
const SMALL_INTEGER_EXT: u8 = 97;
const INTEGER_EXT: u8 = 98;
const ATOM_EXT: u8 = 100;
const SMALL_TUPLE_EXT: u8 = 104;
const LARGE_TUPLE_EXT: u8 = 105;
const NIL_EXT: u8 = 106;
const STRING_EXT: u8 = 107;
const LIST_EXT: u8 = 108;
const BINARY_EXT: u8 = 109;
const SMALL_BIG_EXT: u8 = 110;
const LARGE_BIG_EXT: u8 = 111;
const SMALL_ATOM_EXT: u8 = 115;
const MAP_EXT: u8 = 116;
const ATOM_UTF8_EXT: u8 = 118;
const SMALL_ATOM_UTF8_EXT: u8 = 119;

/// Limits applied while decoding.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TermLimits {
    pub max_depth: usize,
    pub max_size: usize,
}

/// Decode a complete binary term.
pub(crate) fn decode_term(
    input: &[u8],
    known_atoms: Option<&HashSet<String>>,
    limits: TermLimits,
) -> Result<Value, SanitizeError> {
    match input.first() {
        Some(&VERSION) => {}
        Some(other) => return Err(decode_error(format!("unsupported version byte {}", other))),
        None => return Err(decode_error("empty input")),
    }

    let mut decoder = TermDecoder {
        input,
        pos: 1,
        known_atoms,
        limits,
        count: 0,
    };
    let value = decoder.term(0)?;
    if decoder.pos != input.len() {
        return Err(decode_error(format!(
            "{} trailing bytes",
            input.len() - decoder.pos
        )));
    }
    Ok(value)
}

fn decode_error(detail: impl Into<String>) -> SanitizeError {
    SanitizeError::BinaryDecodeError(detail.into())
}

struct TermDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    known_atoms: Option<&'a HashSet<String>>,
    limits: TermLimits,
    count: usize,
}

impl<'a> TermDecoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SanitizeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| decode_error("unexpected end of input"))?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, SanitizeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, SanitizeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, SanitizeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    /// Count one decoded term against the size limit.
    fn bump(&mut self) -> Result<(), SanitizeError> {
        self.count += 1;
        if self.count > self.limits.max_size {
            return Err(SanitizeError::MaxSizeExceeded {
                actual: self.count,
                limit: self.limits.max_size,
            });
        }
        Ok(())
    }

    /// Reject a container header whose declared element count cannot fit.
    fn reserve(&self, elements: usize) -> Result<(), SanitizeError> {
        let projected = self.count.saturating_add(elements);
        if projected > self.limits.max_size {
            return Err(SanitizeError::MaxSizeExceeded {
                actual: projected,
                limit: self.limits.max_size,
            });
        }
        // every element needs at least one byte
        if elements > self.remaining() {
            return Err(decode_error("declared length exceeds input"));
        }
        Ok(())
    }

    fn enter(&self, depth: usize) -> Result<usize, SanitizeError> {
        let depth = depth + 1;
        if depth > self.limits.max_depth {
            return Err(SanitizeError::MaxDepthExceeded(self.limits.max_depth));
        }
        Ok(depth)
    }

    fn term(&mut self, depth: usize) -> Result<Value, SanitizeError> {
        self.bump()?;
        let tag = self.read_u8()?;
        match tag {
            SMALL_INTEGER_EXT => Ok(Value::from(self.read_u8()?)),
            INTEGER_EXT => Ok(Value::from(self.read_u32()? as i32)),
            NEW_FLOAT_EXT => {
                let bytes = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Number::from_f64(f64::from_be_bytes(raw))
                    .map(Value::Number)
                    .ok_or_else(|| decode_error("non-finite float"))
            }
            SMALL_BIG_EXT => {
                let n = self.read_u8()? as usize;
                self.big(n)
            }
            LARGE_BIG_EXT => {
                let n = self.read_u32()? as usize;
                self.big(n)
            }
            ATOM_EXT => {
                let len = self.read_u16()? as usize;
                let name = self.take(len)?.iter().map(|b| *b as char).collect();
                self.atom(name)
            }
            SMALL_ATOM_EXT => {
                let len = self.read_u8()? as usize;
                let name = self.take(len)?.iter().map(|b| *b as char).collect();
                self.atom(name)
            }
            ATOM_UTF8_EXT => {
                let len = self.read_u16()? as usize;
                let name = self.utf8(len)?;
                self.atom(name)
            }
            SMALL_ATOM_UTF8_EXT => {
                let len = self.read_u8()? as usize;
                let name = self.utf8(len)?;
                self.atom(name)
            }
            BINARY_EXT => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                Ok(match std::str::from_utf8(bytes) {
                    Ok(text) => Value::String(text.to_string()),
                    Err(_) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
                })
            }
            STRING_EXT => {
                let len = self.read_u16()? as usize;
                self.reserve(len)?;
                self.count += len;
                let bytes = self.take(len)?;
                Ok(Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()))
            }
            NIL_EXT => Ok(Value::Array(Vec::new())),
            SMALL_TUPLE_EXT => {
                let arity = self.read_u8()? as usize;
                self.sequence(arity, depth)
            }
            LARGE_TUPLE_EXT => {
                let arity = self.read_u32()? as usize;
                self.sequence(arity, depth)
            }
            LIST_EXT => {
                let len = self.read_u32()? as usize;
                let list = self.sequence(len, depth)?;
                match self.read_u8()? {
                    NIL_EXT => Ok(list),
                    _ => Err(decode_error("improper lists are not supported")),
                }
            }
            MAP_EXT => {
                let arity = self.read_u32()? as usize;
                self.map(arity, depth)
            }
            COMPRESSED => Err(decode_error("compressed terms are not accepted")),
            other => Err(decode_error(format!("unsupported tag {}", other))),
        }
    }

    fn sequence(&mut self, len: usize, depth: usize) -> Result<Value, SanitizeError> {
        let depth = self.enter(depth)?;
        self.reserve(len)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(self.term(depth)?);
        }
        Ok(Value::Array(items))
    }

    fn map(&mut self, arity: usize, depth: usize) -> Result<Value, SanitizeError> {
        let depth = self.enter(depth)?;
        self.reserve(arity.saturating_mul(2))?;
        let mut object = Map::new();
        for _ in 0..arity {
            let key = match self.term(depth)? {
                Value::String(key) => key,
                Value::Bool(b) => b.to_string(),
                Value::Null => "nil".to_string(),
                _ => return Err(decode_error("map keys must be atoms or binaries")),
            };
            let value = self.term(depth)?;
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }

    fn utf8(&mut self, len: usize) -> Result<String, SanitizeError> {
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| decode_error("atom is not valid UTF-8"))
    }

    fn big(&mut self, n: usize) -> Result<Value, SanitizeError> {
        let sign = self.read_u8()?;
        let digits = self.take(n)?;
        if digits.iter().skip(8).any(|d| *d != 0) {
            return Err(decode_error("integer out of range"));
        }
        let magnitude = digits
            .iter()
            .take(8)
            .enumerate()
            .fold(0u64, |acc, (i, d)| acc | (u64::from(*d) << (8 * i)));

        match sign {
            0 => Ok(Value::from(magnitude)),
            1 => {
                let negative = -i128::from(magnitude);
                i64::try_from(negative)
                    .map(Value::from)
                    .map_err(|_| decode_error("integer out of range"))
            }
            other => Err(decode_error(format!("invalid sign byte {}", other))),
        }
    }

    fn atom(&self, name: String) -> Result<Value, SanitizeError> {
        match name.as_str() {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "nil" => return Ok(Value::Null),
            _ => {}
        }
        match self.known_atoms {
            Some(known) if known.contains(&name) => Ok(Value::String(name)),
            _ => {
                tracing::warn!(atom = %name, "Binary term references unknown atom");
                Err(SanitizeError::UnknownAtom(name))
            }
        }
    }
}
