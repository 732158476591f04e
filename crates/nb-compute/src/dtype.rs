use std::fmt;

use crate::error::{ComputeError, Result};

/// Elements per block for the GGUF block-quantized formats.
const QK: usize = 32;

/// Storage types a GGUF tensor may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// IEEE 754 half precision.
    F16,
    /// 4-bit block quantization: f16 scale + 32 packed nibbles.
    Q4_0,
    /// 8-bit block quantization: f16 scale + 32 signed bytes.
    Q8_0,
}

impl DType {
    /// Bytes per element for plain types, bytes per block for quantized ones.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::Q4_0 => 2 + QK / 2,
            DType::Q8_0 => 2 + QK,
        }
    }

    /// Maps a GGUF `ggml_type` id to a `DType`.
    pub fn from_gguf_type(id: u32) -> Option<DType> {
        match id {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            2 => Some(DType::Q4_0),
            8 => Some(DType::Q8_0),
            _ => None,
        }
    }

    /// The GGUF `ggml_type` id for this dtype.
    pub fn to_gguf_type(&self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
            DType::Q4_0 => 2,
            DType::Q8_0 => 8,
        }
    }

    /// Elements per block; 1 for non-quantized types.
    pub fn block_size(&self) -> usize {
        match self {
            DType::F32 | DType::F16 => 1,
            DType::Q4_0 | DType::Q8_0 => QK,
        }
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self, DType::Q4_0 | DType::Q8_0)
    }

    /// Byte size of `numel` elements stored in this dtype, or `None` if it
    /// does not fit in `usize`.
    pub fn storage_size(&self, numel: usize) -> Option<usize> {
        numel
            .div_ceil(self.block_size())
            .checked_mul(self.size_in_bytes())
    }

    /// Decode `numel` little-endian elements from `raw` into f32.
    ///
    /// Fails instead of panicking when `raw` is shorter than the tensor
    /// requires, so truncated model files surface as load errors.
    pub fn dequantize(&self, raw: &[u8], numel: usize) -> Result<Vec<f32>> {
        let needed = self
            .storage_size(numel)
            .ok_or_else(|| ComputeError::TooLarge {
                dtype: self.to_string(),
                numel,
            })?;
        if raw.len() < needed {
            return Err(ComputeError::Truncated {
                dtype: self.to_string(),
                needed,
                available: raw.len(),
            });
        }
        let raw = &raw[..needed];

        let mut out = Vec::with_capacity(numel);
        match self {
            DType::F32 => out.extend(
                raw.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ),
            DType::F16 => out.extend(
                raw.chunks_exact(2)
                    .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32()),
            ),
            DType::Q4_0 => {
                for block in raw.chunks_exact(self.size_in_bytes()) {
                    let scale = half::f16::from_le_bytes([block[0], block[1]]).to_f32();
                    let quants = &block[2..];
                    // Low nibbles hold elements 0..16, high nibbles 16..32.
                    out.extend(quants.iter().map(|q| ((q & 0x0F) as i32 - 8) as f32 * scale));
                    out.extend(quants.iter().map(|q| ((q >> 4) as i32 - 8) as f32 * scale));
                }
            }
            DType::Q8_0 => {
                for block in raw.chunks_exact(self.size_in_bytes()) {
                    let scale = half::f16::from_le_bytes([block[0], block[1]]).to_f32();
                    out.extend(block[2..].iter().map(|&q| q as i8 as f32 * scale));
                }
            }
        }
        out.truncate(numel);
        Ok(out)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::Q4_0 => write!(f, "q4_0"),
            DType::Q8_0 => write!(f, "q8_0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gguf_type_ids() {
        for dtype in [DType::F32, DType::F16, DType::Q4_0, DType::Q8_0] {
            assert_eq!(DType::from_gguf_type(dtype.to_gguf_type()), Some(dtype));
        }
        assert!(DType::from_gguf_type(999).is_none());
    }

    #[test]
    fn test_storage_size() {
        assert_eq!(DType::F32.storage_size(10), Some(40));
        assert_eq!(DType::F16.storage_size(10), Some(20));
        assert_eq!(DType::Q4_0.storage_size(64), Some(36));
        assert_eq!(DType::Q8_0.storage_size(33), Some(68));
    }

    #[test]
    fn test_storage_size_overflow() {
        assert_eq!(DType::F32.storage_size(1 << 62), None);
        assert_eq!(DType::F16.storage_size(usize::MAX), None);
        let err = DType::F32.dequantize(&[0u8; 8], 1 << 62).unwrap_err();
        assert!(matches!(err, ComputeError::TooLarge { .. }));
    }

    #[test]
    fn test_dequantize_f32_and_f16() {
        let raw: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(DType::F32.dequantize(&raw, 2).unwrap(), vec![1.5, -2.0]);

        let raw: Vec<u8> = [0.5f32, 3.0]
            .iter()
            .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
            .collect();
        assert_eq!(DType::F16.dequantize(&raw, 2).unwrap(), vec![0.5, 3.0]);
    }

    #[test]
    fn test_dequantize_q8_0() {
        let mut block = half::f16::from_f32(0.5).to_le_bytes().to_vec();
        block.extend((0..32).map(|i| (i as i8 - 16) as u8));
        let out = DType::Q8_0.dequantize(&block, 32).unwrap();
        assert_eq!(out[0], -8.0);
        assert_eq!(out[16], 0.0);
        assert_eq!(out[31], 7.5);
    }

    #[test]
    fn test_dequantize_q4_0_nibble_order() {
        let mut block = half::f16::from_f32(1.0).to_le_bytes().to_vec();
        // low nibble 9 (-> 1.0), high nibble 7 (-> -1.0)
        block.extend(std::iter::repeat(0x79u8).take(16));
        let out = DType::Q4_0.dequantize(&block, 32).unwrap();
        assert!(out[..16].iter().all(|&v| v == 1.0));
        assert!(out[16..].iter().all(|&v| v == -1.0));
    }

    #[test]
    fn test_dequantize_truncated() {
        let err = DType::F32.dequantize(&[0u8; 7], 2).unwrap_err();
        assert!(matches!(err, ComputeError::Truncated { needed: 8, available: 7, .. }));
    }
}
