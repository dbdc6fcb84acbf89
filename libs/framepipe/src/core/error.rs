// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Codec error ({code}): {message}")]
    Codec { code: i32, message: String },

    #[error("Hardware device error: {0}")]
    HardwareDevice(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("GPU import failed: {0}")]
    GpuImport(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Status code following the stage convention: zero is success, negative
    /// values are codec-library codes, positive values are domain codes.
    pub fn status_code(&self) -> i32 {
        match self {
            PipelineError::Codec { code, .. } if *code < 0 => *code,
            PipelineError::Codec { .. } => 2,
            PipelineError::Configuration(_) => 1,
            PipelineError::HardwareDevice(_) => 3,
            PipelineError::UnsupportedFormat(_) => 4,
            PipelineError::GpuImport(_) => 5,
            PipelineError::InvalidState(_) => 6,
            PipelineError::Sink(_) => 7,
            PipelineError::NotFound(_) => 8,
            PipelineError::Io(_) => 9,
            PipelineError::Other(_) => 10,
        }
    }
}

impl From<CodecError> for PipelineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Again => PipelineError::Codec {
                code: CodecError::AGAIN_CODE,
                message: "codec needs its output drained".into(),
            },
            CodecError::Eof => PipelineError::Codec {
                code: CodecError::EOF_CODE,
                message: "codec reached end of stream".into(),
            },
            CodecError::Failed { code, message } => PipelineError::Codec { code, message },
        }
    }
}

/// Outcome of a single codec send/receive call.
///
/// `Again` and `Eof` are flow control, not failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Send: output must be drained first. Receive: more input is needed.
    #[error("resource temporarily unavailable")]
    Again,

    #[error("end of stream")]
    Eof,

    #[error("codec failure ({code}): {message}")]
    Failed { code: i32, message: String },
}

impl CodecError {
    pub const AGAIN_CODE: i32 = -11;
    pub const EOF_CODE: i32 = -0x20464F45;

    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        CodecError::Failed {
            code,
            message: message.into(),
        }
    }

    /// Whether the inner drain loop should stop without treating this as an error.
    pub fn ends_drain(&self) -> bool {
        matches!(self, CodecError::Again | CodecError::Eof)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
