use serde_json::json;

use crate::directory::Directory;
use crate::error::{FsError, Result};
use crate::file::{File, FileEntry};
use crate::location::Location;
use crate::storage::SharedStorage;
use crate::validation::{UploadRules, UploadValidator, UploadedFile};

pub const DEFAULT_TMP_DIR: &str = "/tmp_";

pub const CONTENT_TYPE_TEXT: &str = "text/plain";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Result of handling a batch of uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every file passed validation and was written to the tmp dir.
    Stored { ids: Vec<String> },
    /// A file failed validation; nothing after it was processed.
    Rejected { errors: Vec<String> },
}

impl UploadOutcome {
    pub fn status(&self) -> u16 {
        match self {
            Self::Stored { .. } => 201,
            Self::Rejected { .. } => 400,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Stored { ids } if ids.len() == 1 => CONTENT_TYPE_TEXT,
            _ => CONTENT_TYPE_JSON,
        }
    }

    /// Response body: a lone id as plain text, otherwise JSON.
    pub fn body(&self) -> Result<String> {
        match self {
            Self::Stored { ids } if ids.len() == 1 => Ok(ids[0].clone()),
            Self::Stored { ids } => Ok(serde_json::to_string(ids)?),
            Self::Rejected { errors } => Ok(serde_json::to_string(&json!({ "errors": errors }))?),
        }
    }
}

/// Validates uploads, stages them in a tmp dir and later relocates them.
pub struct UploadHandler {
    storage: SharedStorage,
    validator: Box<dyn UploadValidator>,
    tmp_dir: Location,
}

impl UploadHandler {
    /// Handler with the default rules (jpeg/png up to 5 MiB).
    pub fn new(storage: SharedStorage) -> Self {
        Self::with_validator(storage, Box::new(UploadRules::default()))
    }

    pub fn with_validator(storage: SharedStorage, validator: Box<dyn UploadValidator>) -> Self {
        Self {
            storage,
            validator,
            tmp_dir: Location::new(DEFAULT_TMP_DIR),
        }
    }

    pub fn tmp_dir(&self) -> &Location {
        &self.tmp_dir
    }

    pub fn set_tmp_dir(&mut self, dir: impl Into<Location>) {
        self.tmp_dir = dir.into();
    }

    /// Validate `file` and write it to `location/<client filename>`.
    /// Returns the client filename, which identifies the file from then on.
    pub fn process_file(&self, location: &Location, file: &dyn UploadedFile) -> Result<String> {
        self.validator.validate(file)?;

        let id = file.client_filename().to_string();
        let target = location.append([id.as_str()]);
        if target == *location {
            return Err(FsError::InvalidOperation(format!(
                "Upload has no usable filename: {:?}",
                id
            )));
        }
        self.storage.write(&target, file.content())?;
        tracing::debug!("Stored upload {} ({} bytes)", target, file.content().len());
        Ok(id)
    }

    /// Stage every file in the tmp dir. Stops at the first validation
    /// failure; storage failures are returned as errors.
    pub fn handle(&self, files: &[&dyn UploadedFile]) -> Result<UploadOutcome> {
        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            match self.process_file(&self.tmp_dir, *file) {
                Ok(id) => ids.push(id),
                Err(FsError::ValidationFailed { file, errors }) => {
                    tracing::warn!("Upload {} rejected", file);
                    return Ok(UploadOutcome::Rejected { errors });
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!("Stored {} upload(s) in {}", ids.len(), self.tmp_dir);
        Ok(UploadOutcome::Stored { ids })
    }

    /// Move staged files into `location`, creating it when missing.
    pub fn move_uploaded_files<S: AsRef<str>>(
        &self,
        location: impl Into<Location>,
        ids: &[S],
    ) -> Result<Vec<FileEntry>> {
        let destination = Directory::create(location, &self.storage)?;
        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            let mut entry = File::open(self.tmp_dir.append([id.as_ref()]), &self.storage)?;
            entry.file_mut().move_to(destination.location().clone())?;
            moved.push(entry);
        }
        tracing::info!("Moved {} upload(s) to {}", moved.len(), destination.location());
        Ok(moved)
    }
}
