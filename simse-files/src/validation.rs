use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{FsError, Result};
use crate::location::Location;
use crate::mime;

pub const MAX_FILESIZE_1MB: u64 = 1024 * 1024;
pub const MAX_FILESIZE_3MB: u64 = 3 * MAX_FILESIZE_1MB;
pub const MAX_FILESIZE_5MB: u64 = 5 * MAX_FILESIZE_1MB;
pub const MAX_FILESIZE_10MB: u64 = 10 * MAX_FILESIZE_1MB;
pub const MAX_FILESIZE_15MB: u64 = 15 * MAX_FILESIZE_1MB;
pub const MAX_FILESIZE_20MB: u64 = 20 * MAX_FILESIZE_1MB;
pub const MAX_FILESIZE_25MB: u64 = 25 * MAX_FILESIZE_1MB;

/// A file received from a client, not yet in storage.
pub trait UploadedFile {
    fn client_filename(&self) -> &str;

    fn content(&self) -> &[u8];

    /// Media type claimed by the client. Never trusted by the validator.
    fn client_media_type(&self) -> Option<&str> {
        None
    }
}

/// An upload held entirely in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedUpload {
    pub filename: String,
    pub content: Vec<u8>,
    pub media_type: Option<String>,
}

impl BufferedUpload {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

impl UploadedFile for BufferedUpload {
    fn client_filename(&self) -> &str {
        &self.filename
    }

    fn content(&self) -> &[u8] {
        &self.content
    }

    fn client_media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }
}

pub trait UploadValidator: Send + Sync {
    /// Fails with `ValidationFailed` listing every violated rule.
    fn validate(&self, file: &dyn UploadedFile) -> Result<()>;
}

/// Allow-lists and a size limit. Empty lists and a missing limit disable
/// the corresponding check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadRules {
    pub mime_types: Vec<String>,
    #[serde(deserialize_with = "normalized_extensions")]
    pub extensions: Vec<String>,
    pub max_size: Option<u64>,
}

/// Allow-list form of an extension: no leading dot, lowercase.
fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

fn normalized_extensions<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().map(|ext| normalize_extension(ext)).collect())
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            mime_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            extensions: Vec::new(),
            max_size: Some(MAX_FILESIZE_5MB),
        }
    }
}

impl UploadRules {
    /// Rules that accept anything.
    pub fn permissive() -> Self {
        Self {
            mime_types: Vec::new(),
            extensions: Vec::new(),
            max_size: None,
        }
    }

    pub fn with_mime_types<I, S>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(&ext.into()))
            .collect();
        self
    }

    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Mime type from the content, falling back to the client filename.
    pub fn detect_mime_type(file: &dyn UploadedFile) -> String {
        mime::detect(&Location::new(file.client_filename()), file.content())
    }

    /// Extension from the content, falling back to the client filename.
    pub fn detect_extension(file: &dyn UploadedFile) -> String {
        let location = Location::new(file.client_filename());
        mime::sniff_extension(file.content())
            .or_else(|| location.extension())
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

impl UploadValidator for UploadRules {
    fn validate(&self, file: &dyn UploadedFile) -> Result<()> {
        let name = file.client_filename();
        let mut errors = Vec::new();

        if !self.mime_types.is_empty() {
            let mime_type = Self::detect_mime_type(file);
            if !self
                .mime_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&mime_type))
            {
                errors.push(format!(
                    "Invalid mimeType: {}, allowed types: {}; File: {}",
                    mime_type,
                    self.mime_types.join(","),
                    name
                ));
            }
        }

        if !self.extensions.is_empty() {
            let ext = Self::detect_extension(file);
            if !self
                .extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            {
                errors.push(format!(
                    "Invalid file extension: {}, allowed extensions: {}; File: {}",
                    ext,
                    self.extensions.join(","),
                    name
                ));
            }
        }

        if let Some(max_size) = self.max_size {
            if file.content().len() as u64 > max_size {
                errors.push(format!("Maximum file size exceeded; File: {}", name));
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        tracing::debug!("Rejected upload {}: {} violation(s)", name, errors.len());
        Err(FsError::ValidationFailed {
            file: name.to_string(),
            errors,
        })
    }
}
