//! Local checks applied to a video before it is sent to the server.

use std::path::{Path, PathBuf};

use crate::config::UploadConfig;
use crate::error::{Result, SpeedcamError, ValidationError};

/// A file chosen for upload, with the metadata needed to validate and send it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSource {
    pub path: PathBuf,
    pub filename: String,
    pub mime: String,
    pub size: u64,
}

impl UploadSource {
    /// Reads the file's metadata. The content is only read when it is sent.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| ValidationError::MissingFileName(path.to_path_buf()))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ValidationError::UnreadableFile {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !metadata.is_file() {
            return Err(SpeedcamError::Validation(ValidationError::UnreadableFile {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            }));
        }

        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            filename,
            mime,
            size: metadata.len(),
        })
    }

    /// Lowercased extension with a leading dot, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
            .unwrap_or_default()
    }
}

/// Extension allow-list and size ceiling for uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRules {
    allowed_extensions: Vec<String>,
    max_file_size: u64,
}

impl UploadRules {
    pub fn new<S: AsRef<str>>(allowed_extensions: &[S], max_file_size: u64) -> Self {
        let allowed_extensions = allowed_extensions
            .iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| ext.len() > 1)
            .collect();

        Self {
            allowed_extensions,
            max_file_size,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn validate(&self, file: &UploadSource) -> std::result::Result<(), ValidationError> {
        let extension = file.extension();
        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::UnsupportedExtension {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }

        if file.size == 0 {
            return Err(ValidationError::EmptyFile(file.filename.clone()));
        }

        if file.size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size: file.size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }
}

impl Default for UploadRules {
    fn default() -> Self {
        UploadRules::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for UploadRules {
    fn from(config: &UploadConfig) -> Self {
        Self::new(&config.allowed_extensions, config.max_file_size)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    format!(".{}", ext)
}
