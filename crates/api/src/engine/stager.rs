//! Input staging.
//!
//! Writes the base64 images embedded in a submission into the engine's
//! input directory so that `LoadImage` nodes can reference them by name.
//! Every image is decoded and its name checked before anything is written,
//! so a bad entry leaves the directory untouched.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use relay_core::error::CoreError;
use serde::Deserialize;

use crate::error::AppError;

/// One embedded input image from a `/run` request.
#[derive(Debug, Clone, Deserialize)]
pub struct InputImage {
    /// File name the workflow refers to.
    pub name: String,
    /// Base64 payload, optionally prefixed with a `data:` URL header.
    pub image: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Invalid image name '{0}'")]
    InvalidName(String),

    #[error("Image '{name}' is not valid base64: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<StageError> for AppError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::InvalidName(_) | StageError::Decode { .. } => {
                AppError::Core(CoreError::Validation(err.to_string()))
            }
            StageError::Io { .. } => AppError::InternalError(err.to_string()),
        }
    }
}

/// Writes submission images into the engine's input directory.
pub struct InputStager {
    input_dir: PathBuf,
}

impl InputStager {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }

    /// Decode and write every image, creating the directory if needed.
    ///
    /// An existing file with the same name is overwritten. Returns the
    /// written paths in input order.
    pub async fn stage(&self, images: &[InputImage]) -> Result<Vec<PathBuf>, StageError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let decoded = images
            .iter()
            .map(|img| {
                validate_name(&img.name)?;
                let bytes = STANDARD
                    .decode(strip_data_url(&img.image).trim())
                    .map_err(|source| StageError::Decode {
                        name: img.name.clone(),
                        source,
                    })?;
                Ok((self.input_dir.join(&img.name), bytes))
            })
            .collect::<Result<Vec<_>, StageError>>()?;

        tokio::fs::create_dir_all(&self.input_dir)
            .await
            .map_err(|source| StageError::Io {
                path: self.input_dir.clone(),
                source,
            })?;

        let mut written = Vec::with_capacity(decoded.len());
        for (path, bytes) in decoded {
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|source| StageError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "Staged input image");
            written.push(path);
        }

        Ok(written)
    }
}

/// Names must stay inside the input directory.
fn validate_name(name: &str) -> Result<(), StageError> {
    let invalid = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Drop a `data:<mime>;base64,` prefix if present.
fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, data)) = payload.split_once(',') {
            return data;
        }
    }
    payload
}
