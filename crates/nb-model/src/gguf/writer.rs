use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nb_compute::DType;

use super::header::{GGUF_DEFAULT_ALIGNMENT, GGUF_MAGIC};
use super::metadata::GgufMetadataValue;
use super::tensor_info::checked_numel;
use crate::error::{ModelError, Result};

struct PendingTensor {
    name: String,
    dims: Vec<u64>,
    dtype: DType,
    data: Vec<u8>,
}

/// Writes GGUF v3 files.
///
/// Metadata entries keep insertion order. Tensor data is laid out in
/// insertion order, each tensor padded to the file alignment.
#[derive(Default)]
pub struct GgufWriter {
    metadata: Vec<(String, GgufMetadataValue)>,
    tensors: Vec<PendingTensor>,
}

impl GgufWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metadata(&mut self, key: &str, value: GgufMetadataValue) -> &mut Self {
        self.metadata.push((key.to_string(), value));
        self
    }

    /// Add an f32 tensor. `dims` are innermost first, as GGUF stores them.
    pub fn add_tensor_f32(&mut self, name: &str, dims: &[u64], data: &[f32]) -> &mut Self {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.add_tensor_raw(name, dims, DType::F32, bytes)
    }

    /// Add a tensor whose bytes are already encoded in `dtype`.
    pub fn add_tensor_raw(
        &mut self,
        name: &str,
        dims: &[u64],
        dtype: DType,
        data: Vec<u8>,
    ) -> &mut Self {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            dims: dims.to_vec(),
            dtype,
            data,
        });
        self
    }

    fn alignment(&self) -> usize {
        self.metadata
            .iter()
            .find(|(k, _)| k == "general.alignment")
            .and_then(|(_, v)| v.as_u64())
            .map(|a| a as usize)
            .filter(|a| a.is_power_of_two())
            .unwrap_or(GGUF_DEFAULT_ALIGNMENT)
    }

    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        let alignment = self.alignment();
        let mut counter = CountingWriter { inner: out, written: 0 };
        let w = &mut counter;

        w.write_all(&GGUF_MAGIC)?;
        w.write_all(&3u32.to_le_bytes())?;
        w.write_all(&(self.tensors.len() as u64).to_le_bytes())?;
        w.write_all(&(self.metadata.len() as u64).to_le_bytes())?;

        for (key, value) in &self.metadata {
            write_string(w, key)?;
            w.write_all(&value.type_id().to_le_bytes())?;
            write_value(w, value)?;
        }

        let mut offset = 0u64;
        for t in &self.tensors {
            let expected = checked_numel(&t.dims)
                .and_then(|n| t.dtype.storage_size(n))
                .ok_or_else(|| ModelError::Malformed(format!("tensor '{}' is too large", t.name)))?;
            if t.data.len() != expected {
                return Err(ModelError::TensorShape {
                    name: t.name.clone(),
                    expected,
                    got: t.data.len(),
                });
            }
            write_string(w, &t.name)?;
            w.write_all(&(t.dims.len() as u32).to_le_bytes())?;
            for d in &t.dims {
                w.write_all(&d.to_le_bytes())?;
            }
            w.write_all(&t.dtype.to_gguf_type().to_le_bytes())?;
            w.write_all(&offset.to_le_bytes())?;
            offset = (offset + t.data.len() as u64).next_multiple_of(alignment as u64);
        }

        for t in &self.tensors {
            w.pad_to(alignment)?;
            w.write_all(&t.data)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)
    }
}

/// Tracks the absolute output position so padding can be computed.
struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    written: usize,
}

impl<W: Write> CountingWriter<'_, W> {
    fn pad_to(&mut self, alignment: usize) -> std::io::Result<()> {
        let padding = self.written.next_multiple_of(alignment) - self.written;
        self.write_all(&vec![0u8; padding])
    }
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn write_string(w: &mut impl Write, s: &str) -> Result<()> {
    w.write_all(&(s.len() as u64).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_value(w: &mut impl Write, value: &GgufMetadataValue) -> Result<()> {
    use GgufMetadataValue as V;

    match value {
        V::U8(v) => w.write_all(&v.to_le_bytes())?,
        V::I8(v) => w.write_all(&v.to_le_bytes())?,
        V::U16(v) => w.write_all(&v.to_le_bytes())?,
        V::I16(v) => w.write_all(&v.to_le_bytes())?,
        V::U32(v) => w.write_all(&v.to_le_bytes())?,
        V::I32(v) => w.write_all(&v.to_le_bytes())?,
        V::U64(v) => w.write_all(&v.to_le_bytes())?,
        V::I64(v) => w.write_all(&v.to_le_bytes())?,
        V::F32(v) => w.write_all(&v.to_le_bytes())?,
        V::F64(v) => w.write_all(&v.to_le_bytes())?,
        V::Bool(v) => w.write_all(&[*v as u8])?,
        V::String(s) => write_string(w, s)?,
        V::Array(values) => {
            // GGUF arrays are homogeneous; an empty array is typed as U8.
            let elem_type = values.first().map_or(0, GgufMetadataValue::type_id);
            if values.iter().any(|v| v.type_id() != elem_type) {
                return Err(ModelError::Malformed("heterogeneous metadata array".to_string()));
            }
            w.write_all(&elem_type.to_le_bytes())?;
            w.write_all(&(values.len() as u64).to_le_bytes())?;
            for v in values {
                write_value(w, v)?;
            }
        }
    }
    Ok(())
}
