//! Core types shared by the Tandem sidecar invocation layer.
//!
//! This crate provides the vocabulary used by the bridge and diagnostics crates:
//! - Reserved metadata keys and media types
//! - gRPC status codes and the `Status` value with structured details
//! - Error types
//! - Pooled buffers for streaming copies

pub mod buffer;
pub mod code;
pub mod error;
pub mod keys;
pub mod status;

pub use buffer::{copy_with_pool, BufferPool, PooledBuffer, STREAM_BUFFER_SIZE};
pub use code::Code;
pub use error::{TandemError, TandemResult};
pub use status::{ErrorInfo, InternalStatus, Status};
