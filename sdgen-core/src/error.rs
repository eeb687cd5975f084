//! Generation errors.
//!
//! Only bad mode/input combinations get their own variant. Everything raised by
//! the diffusion runtime or the filesystem is passed through untouched.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("cannot generate image for pipeline {mode} and {prompt}: {reason}")]
    InvalidRequest {
        mode: String,
        prompt: String,
        reason: String,
    },

    #[error(transparent)]
    Pipeline(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

impl GenerateError {
    pub(crate) fn invalid(
        mode: impl Into<String>,
        prompt: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        GenerateError::InvalidRequest {
            mode: mode.into(),
            prompt: prompt.into(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, GenerateError::InvalidRequest { .. })
    }
}

pub type Result<T> = std::result::Result<T, GenerateError>;
