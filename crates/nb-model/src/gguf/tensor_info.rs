use std::io::Read;

use nb_compute::DType;

use super::io::{read_string, read_u32, read_u64, MAX_PREALLOC};
use crate::error::{ModelError, Result};

/// GGML supports at most four tensor dimensions.
const MAX_DIMS: u32 = 4;

/// Describes a single tensor stored within a GGUF file.
#[derive(Debug, Clone, PartialEq)]
pub struct GgufTensorInfo {
    /// Tensor name (e.g. "blk.0.attn_q.weight").
    pub name: String,
    /// Dimension sizes, innermost (ggml `ne[0]`) first.
    pub dims: Vec<u64>,
    /// Storage type of the tensor data.
    pub dtype: DType,
    /// Byte offset from the start of the tensor data section.
    pub offset: u64,
}

impl GgufTensorInfo {
    /// Total number of elements, or `None` if it overflows `usize`.
    pub fn numel(&self) -> Option<usize> {
        checked_numel(&self.dims)
    }

    /// Byte size of this tensor's raw data in the file, or `None` if it
    /// overflows `usize`.
    pub fn data_size(&self) -> Option<usize> {
        self.dtype.storage_size(self.numel()?)
    }
}

/// Product of `dims`, or `None` if it does not fit in `usize`.
pub(crate) fn checked_numel(dims: &[u64]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| {
        usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
    })
}

/// Parse `n_tensors` entries: name, u32 rank, rank x u64 dims, u32 type id,
/// u64 offset.
pub fn parse_tensor_infos(reader: &mut impl Read, n_tensors: u64) -> Result<Vec<GgufTensorInfo>> {
    let mut infos = Vec::with_capacity((n_tensors as usize).min(MAX_PREALLOC));
    for _ in 0..n_tensors {
        let name = read_string(reader)?;

        let n_dims = read_u32(reader)?;
        if n_dims > MAX_DIMS {
            return Err(ModelError::Malformed(format!(
                "tensor '{}' has {} dimensions",
                name, n_dims
            )));
        }
        let dims = (0..n_dims)
            .map(|_| read_u64(reader))
            .collect::<Result<Vec<_>>>()?;

        let type_id = read_u32(reader)?;
        let dtype = DType::from_gguf_type(type_id).ok_or(ModelError::UnsupportedGgufType(type_id))?;
        let offset = read_u64(reader)?;

        let info = GgufTensorInfo {
            name,
            dims,
            dtype,
            offset,
        };
        if info.data_size().is_none() {
            return Err(ModelError::Malformed(format!(
                "tensor '{}' with dims {:?} is too large",
                info.name, info.dims
            )));
        }
        infos.push(info);
    }
    Ok(infos)
}
