//! `nb-compute` - CPU compute kernels for the native-bridge evaluation library.
//!
//! This crate provides:
//! - A `ComputeBackend` trait for the vector/matrix operations a llama-family
//!   forward pass needs
//! - `CpuBackend`, a pure-Rust implementation that splits large matrix
//!   products across scoped worker threads
//! - `DType` definitions for GGUF tensor storage and block dequantization

pub mod backend;
pub mod cpu;
pub mod dtype;
pub mod error;

pub use backend::ComputeBackend;
pub use cpu::CpuBackend;
pub use dtype::DType;
pub use error::{ComputeError, Result};
