//! Little-endian primitives shared by the GGUF parser.

use std::io::Read;

use crate::error::{ModelError, Result};

/// Upper bound for a single GGUF string; anything larger is a corrupt file.
const MAX_STRING_LEN: u64 = 1 << 24;

/// Cap for up-front allocations driven by counts read from the file.
pub(crate) const MAX_PREALLOC: usize = 1 << 16;

pub(crate) fn read_bytes<const N: usize>(reader: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_u32(reader: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_bytes(reader)?))
}

pub(crate) fn read_u64(reader: &mut impl Read) -> Result<u64> {
    Ok(u64::from_le_bytes(read_bytes(reader)?))
}

/// Read a GGUF string: u64 length followed by that many UTF-8 bytes.
pub(crate) fn read_string(reader: &mut impl Read) -> Result<String> {
    let len = read_u64(reader)?;
    if len > MAX_STRING_LEN {
        return Err(ModelError::Malformed(format!("string length {} too large", len)));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| ModelError::Malformed(format!("invalid UTF-8 in string: {}", e)))
}
