//! Upload admission checks. Pure: no I/O, no network.

use crate::config::schema::DEFAULT_MAX_FILE_SIZE;
use crate::error::ValidationError;

const ALLOWED_EXTENSION: &str = ".evtx";

/// Matches the `log_files.filename` column constraint.
pub const MAX_FILENAME_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct UploadValidator {
    max_file_size: u64,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl UploadValidator {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Checks are applied in order: name, name length, extension, emptiness,
    /// size.
    pub fn validate(&self, filename: Option<&str>, size: u64) -> Result<(), ValidationError> {
        let filename = match filename {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(ValidationError::MissingFilename),
        };

        let length = filename.chars().count();
        if length > MAX_FILENAME_CHARS {
            return Err(ValidationError::FilenameTooLong {
                length,
                max: MAX_FILENAME_CHARS,
            });
        }

        if !has_evtx_extension(filename) {
            return Err(ValidationError::InvalidExtension {
                filename: filename.to_string(),
            });
        }

        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Rejects uploads whose announced size differs from the bytes received.
    pub fn check_declared_size(&self, declared: u64, actual: u64) -> Result<(), ValidationError> {
        if declared != actual {
            return Err(ValidationError::SizeMismatch { declared, actual });
        }
        Ok(())
    }
}

fn has_evtx_extension(filename: &str) -> bool {
    filename.len() >= ALLOWED_EXTENSION.len()
        && filename
            .get(filename.len() - ALLOWED_EXTENSION.len()..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ALLOWED_EXTENSION))
}
