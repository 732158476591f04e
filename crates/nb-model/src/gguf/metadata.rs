use std::collections::HashMap;
use std::io::Read;

use super::io::{read_bytes, read_string, read_u32, read_u64, MAX_PREALLOC};
use crate::error::{ModelError, Result};

/// A single GGUF metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum GgufMetadataValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<GgufMetadataValue>),
}

impl GgufMetadataValue {
    /// Human-readable variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            GgufMetadataValue::U8(_) => "U8",
            GgufMetadataValue::I8(_) => "I8",
            GgufMetadataValue::U16(_) => "U16",
            GgufMetadataValue::I16(_) => "I16",
            GgufMetadataValue::U32(_) => "U32",
            GgufMetadataValue::I32(_) => "I32",
            GgufMetadataValue::U64(_) => "U64",
            GgufMetadataValue::I64(_) => "I64",
            GgufMetadataValue::F32(_) => "F32",
            GgufMetadataValue::F64(_) => "F64",
            GgufMetadataValue::Bool(_) => "Bool",
            GgufMetadataValue::String(_) => "String",
            GgufMetadataValue::Array(_) => "Array",
        }
    }

    /// GGUF value type id:
    /// 0=U8, 1=I8, 2=U16, 3=I16, 4=U32, 5=I32, 6=F32, 7=Bool,
    /// 8=String, 9=Array, 10=U64, 11=I64, 12=F64
    pub fn type_id(&self) -> u32 {
        match self {
            GgufMetadataValue::U8(_) => 0,
            GgufMetadataValue::I8(_) => 1,
            GgufMetadataValue::U16(_) => 2,
            GgufMetadataValue::I16(_) => 3,
            GgufMetadataValue::U32(_) => 4,
            GgufMetadataValue::I32(_) => 5,
            GgufMetadataValue::F32(_) => 6,
            GgufMetadataValue::Bool(_) => 7,
            GgufMetadataValue::String(_) => 8,
            GgufMetadataValue::Array(_) => 9,
            GgufMetadataValue::U64(_) => 10,
            GgufMetadataValue::I64(_) => 11,
            GgufMetadataValue::F64(_) => 12,
        }
    }

    /// Any non-negative integer variant, widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            GgufMetadataValue::U8(v) => Some(v as u64),
            GgufMetadataValue::U16(v) => Some(v as u64),
            GgufMetadataValue::U32(v) => Some(v as u64),
            GgufMetadataValue::U64(v) => Some(v),
            GgufMetadataValue::I8(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I16(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I32(v) => u64::try_from(v).ok(),
            GgufMetadataValue::I64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Any integer variant, as i64 when it fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            GgufMetadataValue::I8(v) => Some(v as i64),
            GgufMetadataValue::I16(v) => Some(v as i64),
            GgufMetadataValue::I32(v) => Some(v as i64),
            GgufMetadataValue::I64(v) => Some(v),
            _ => self.as_u64().and_then(|v| i64::try_from(v).ok()),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            GgufMetadataValue::F32(v) => Some(v),
            GgufMetadataValue::F64(v) => Some(v as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            GgufMetadataValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GgufMetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[GgufMetadataValue]> {
        match self {
            GgufMetadataValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

/// Collection of GGUF metadata key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct GgufMetadata {
    pub entries: HashMap<String, GgufMetadataValue>,
}

impl GgufMetadata {
    pub fn get(&self, key: &str) -> Option<&GgufMetadataValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up `key` and convert it, distinguishing a missing key from a
    /// value of the wrong type.
    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        convert: impl FnOnce(&'a GgufMetadataValue) -> Option<T>,
    ) -> Result<T> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| ModelError::MissingKey(key.to_string()))?;
        convert(value).ok_or_else(|| ModelError::TypeMismatch {
            key: key.to_string(),
            expected,
            got: value.type_name(),
        })
    }

    pub fn get_string(&self, key: &str) -> Result<&str> {
        self.typed(key, "String", GgufMetadataValue::as_str)
    }

    /// Integer value that fits in a u32.
    pub fn get_u32(&self, key: &str) -> Result<u32> {
        self.typed(key, "U32", |v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.typed(key, "U64", GgufMetadataValue::as_u64)
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        self.typed(key, "unsigned integer", |v| {
            v.as_u64().and_then(|n| usize::try_from(n).ok())
        })
    }

    pub fn get_f32(&self, key: &str) -> Result<f32> {
        self.typed(key, "F32", GgufMetadataValue::as_f32)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.typed(key, "Bool", GgufMetadataValue::as_bool)
    }

    /// Optional lookup: `Ok(None)` when absent, an error only on a type mismatch.
    pub fn optional<T>(
        &self,
        key: &str,
        get: impl FnOnce(&Self, &str) -> Result<T>,
    ) -> Result<Option<T>> {
        if self.contains(key) {
            get(self, key).map(Some)
        } else {
            Ok(None)
        }
    }

    fn array_of<'a, T>(
        &'a self,
        key: &str,
        expected: &'static str,
        convert: impl Fn(&'a GgufMetadataValue) -> Option<T>,
    ) -> Result<Vec<T>> {
        let values = self.typed(key, "Array", GgufMetadataValue::as_array)?;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                convert(v).ok_or_else(|| ModelError::TypeMismatch {
                    key: format!("{}[{}]", key, i),
                    expected,
                    got: v.type_name(),
                })
            })
            .collect()
    }

    pub fn get_string_array(&self, key: &str) -> Result<Vec<String>> {
        self.array_of(key, "String", |v| v.as_str().map(str::to_string))
    }

    pub fn get_f32_array(&self, key: &str) -> Result<Vec<f32>> {
        self.array_of(key, "F32", GgufMetadataValue::as_f32)
    }

    pub fn get_i32_array(&self, key: &str) -> Result<Vec<i32>> {
        self.array_of(key, "I32", |v| v.as_i64().and_then(|n| i32::try_from(n).ok()))
    }

    /// Parse `n_kv` entries: GGUF string key, u32 type id, typed payload.
    pub fn parse_kv(reader: &mut impl Read, n_kv: u64) -> Result<GgufMetadata> {
        let mut entries = HashMap::with_capacity((n_kv as usize).min(MAX_PREALLOC));
        for _ in 0..n_kv {
            let key = read_string(reader)?;
            let type_id = read_u32(reader)?;
            let value = read_value(reader, type_id)?;
            entries.insert(key, value);
        }
        Ok(GgufMetadata { entries })
    }
}

/// Read a single metadata value given its type id.
fn read_value(reader: &mut impl Read, type_id: u32) -> Result<GgufMetadataValue> {
    use GgufMetadataValue as V;

    Ok(match type_id {
        0 => V::U8(u8::from_le_bytes(read_bytes(reader)?)),
        1 => V::I8(i8::from_le_bytes(read_bytes(reader)?)),
        2 => V::U16(u16::from_le_bytes(read_bytes(reader)?)),
        3 => V::I16(i16::from_le_bytes(read_bytes(reader)?)),
        4 => V::U32(read_u32(reader)?),
        5 => V::I32(i32::from_le_bytes(read_bytes(reader)?)),
        6 => V::F32(f32::from_le_bytes(read_bytes(reader)?)),
        7 => V::Bool(read_bytes::<1>(reader)?[0] != 0),
        8 => V::String(read_string(reader)?),
        9 => {
            // Array: element type id, u64 count, then count payloads.
            let elem_type = read_u32(reader)?;
            let count = read_u64(reader)? as usize;
            let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                values.push(read_value(reader, elem_type)?);
            }
            V::Array(values)
        }
        10 => V::U64(read_u64(reader)?),
        11 => V::I64(i64::from_le_bytes(read_bytes(reader)?)),
        12 => V::F64(f64::from_le_bytes(read_bytes(reader)?)),
        other => return Err(ModelError::UnsupportedGgufType(other)),
    })
}
