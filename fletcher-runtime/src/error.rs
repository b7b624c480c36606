//! Error type shared by all platform, context and kernel operations.

use thiserror::Error;

/// Errors reported by the Fletcher runtime layer.
#[derive(Debug, Error)]
pub enum FletcherError {
    /// A platform library could not be opened or lacks a required symbol.
    #[error("could not load platform library '{library}': {reason}")]
    Load { library: String, reason: String },

    /// A platform call returned a non-OK status code.
    #[error("platform '{platform}' {operation} failed with status {status}")]
    Status {
        platform: String,
        operation: &'static str,
        status: u64,
    },

    /// The platform was used before `init` succeeded.
    #[error("platform '{0}' is not initialized")]
    NotInitialized(String),

    /// An MMIO access beyond the register file.
    #[error("MMIO register {0} is out of range")]
    RegisterOutOfRange(u64),

    /// Device allocation or access failure.
    #[error("device memory error: {0}")]
    DeviceMemory(String),

    /// A host buffer does not fit the size the device call expects.
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// Record batches were queued or the context enabled after `enable`.
    #[error("context is already enabled")]
    AlreadyEnabled,

    /// A device buffer index past the buffers the context allocated.
    #[error("context has no device buffer {0}")]
    NoSuchBuffer(usize),

    /// A simulated kernel model failed while executing.
    #[error("kernel model '{model}' failed: {reason}")]
    KernelModel { model: String, reason: String },
}

impl FletcherError {
    pub(crate) fn device_memory(err: anyhow::Error) -> Self {
        FletcherError::DeviceMemory(format!("{:#}", err))
    }
}

/// Result alias for runtime calls.
pub type Result<T> = std::result::Result<T, FletcherError>;
