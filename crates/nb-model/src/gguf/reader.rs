use std::fs::File;
use std::io::Cursor;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use super::header::{GgufHeader, GGUF_DEFAULT_ALIGNMENT};
use super::metadata::GgufMetadata;
use super::tensor_info::{self, GgufTensorInfo};
use crate::error::{ModelError, Result};

/// Backing bytes of an opened model file.
enum FileBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(m) => m,
            FileBytes::Owned(v) => v,
        }
    }
}

/// A parsed GGUF file.
///
/// The header, metadata and tensor info table are parsed up front; tensor
/// data is read lazily out of the memory map (or the in-memory copy when
/// mapping is disabled).
pub struct GgufFile {
    pub header: GgufHeader,
    pub metadata: GgufMetadata,
    pub tensor_infos: Vec<GgufTensorInfo>,
    bytes: FileBytes,
    /// Byte offset within the file where tensor data begins (aligned).
    data_offset: usize,
}

impl GgufFile {
    /// Open a GGUF file with memory-mapped tensor access.
    pub fn open(path: &Path) -> Result<GgufFile> {
        Self::open_with(path, true)
    }

    /// Open a GGUF file, memory-mapping it when `use_mmap` is set and
    /// reading it fully into memory otherwise.
    pub fn open_with(path: &Path, use_mmap: bool) -> Result<GgufFile> {
        let bytes = if use_mmap {
            let file = File::open(path)?;
            // SAFETY: the mapping is read-only and owned by the returned
            // GgufFile; model files are not expected to change while loaded.
            FileBytes::Mapped(unsafe { Mmap::map(&file)? })
        } else {
            FileBytes::Owned(std::fs::read(path)?)
        };
        Self::parse(bytes)
    }

    /// Parse a GGUF image already held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<GgufFile> {
        Self::parse(FileBytes::Owned(bytes))
    }

    fn parse(bytes: FileBytes) -> Result<GgufFile> {
        let mut cursor = Cursor::new(&bytes[..]);
        let header = GgufHeader::parse(&mut cursor)?;
        let metadata = GgufMetadata::parse_kv(&mut cursor, header.n_kv)?;
        let tensor_infos = tensor_info::parse_tensor_infos(&mut cursor, header.n_tensors)?;

        let alignment = match metadata.optional("general.alignment", GgufMetadata::get_usize)? {
            Some(a) if a.is_power_of_two() => a,
            Some(a) => {
                return Err(ModelError::Malformed(format!("alignment {} is not a power of two", a)))
            }
            None => GGUF_DEFAULT_ALIGNMENT,
        };
        let data_offset = (cursor.position() as usize).next_multiple_of(alignment);

        Ok(GgufFile {
            header,
            metadata,
            tensor_infos,
            bytes,
            data_offset,
        })
    }

    pub fn find_tensor(&self, name: &str) -> Option<&GgufTensorInfo> {
        self.tensor_infos.iter().find(|t| t.name == name)
    }

    /// Raw bytes of a tensor, bounds-checked against the file length.
    pub fn tensor_data(&self, info: &GgufTensorInfo) -> Result<&[u8]> {
        let out_of_bounds = || ModelError::TensorOutOfBounds {
            name: info.name.clone(),
            end: usize::MAX,
            len: self.bytes.len(),
        };
        let start = usize::try_from(info.offset)
            .ok()
            .and_then(|o| o.checked_add(self.data_offset))
            .ok_or_else(out_of_bounds)?;
        let size = info.data_size().ok_or_else(|| too_large(info))?;
        let end = start.checked_add(size).ok_or_else(out_of_bounds)?;
        if end > self.bytes.len() {
            return Err(ModelError::TensorOutOfBounds {
                name: info.name.clone(),
                end,
                len: self.bytes.len(),
            });
        }
        Ok(&self.bytes[start..end])
    }

    /// Load a tensor by name, dequantized to f32.
    pub fn tensor_f32(&self, name: &str) -> Result<Vec<f32>> {
        let info = self
            .find_tensor(name)
            .ok_or_else(|| ModelError::TensorNotFound(name.to_string()))?;
        let raw = self.tensor_data(info)?;
        let numel = info.numel().ok_or_else(|| too_large(info))?;
        Ok(info.dtype.dequantize(raw, numel)?)
    }

    /// Load a tensor and check it holds exactly `expected` elements.
    pub fn tensor_f32_sized(&self, name: &str, expected: usize) -> Result<Vec<f32>> {
        let data = self.tensor_f32(name)?;
        if data.len() != expected {
            return Err(ModelError::TensorShape {
                name: name.to_string(),
                expected,
                got: data.len(),
            });
        }
        Ok(data)
    }
}

fn too_large(info: &GgufTensorInfo) -> ModelError {
    ModelError::Malformed(format!("tensor '{}' with dims {:?} is too large", info.name, info.dims))
}
