use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("No such file: {0}")]
    NoSuchFile(String),
    #[error("No such directory: {0}")]
    NoSuchDirectory(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Stream is detached")]
    Detached,
    #[error("Stream is not readable")]
    NotReadable,
    #[error("Stream is not writable")]
    NotWritable,
    #[error("Stream is not seekable")]
    NotSeekable,
    #[error("Uploaded file validation failed: {file}")]
    ValidationFailed { file: String, errors: Vec<String> },
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FsError {
    pub fn code(&self) -> &str {
        match self {
            Self::NoSuchFile(_) => "FS_NO_SUCH_FILE",
            Self::NoSuchDirectory(_) => "FS_NO_SUCH_DIRECTORY",
            Self::AlreadyExists(_) => "FS_ALREADY_EXISTS",
            Self::Detached => "FS_STREAM_DETACHED",
            Self::NotReadable => "FS_STREAM_NOT_READABLE",
            Self::NotWritable => "FS_STREAM_NOT_WRITABLE",
            Self::NotSeekable => "FS_STREAM_NOT_SEEKABLE",
            Self::ValidationFailed { .. } => "FS_VALIDATION_FAILED",
            Self::InvalidOperation(_) => "FS_INVALID_OPERATION",
            Self::InvalidImage(_) => "FS_INVALID_IMAGE",
            Self::Io(_) => "FS_IO_ERROR",
            Self::Json(_) => "FS_JSON_ERROR",
        }
    }

    /// True for both missing files and missing directories.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchFile(_) | Self::NoSuchDirectory(_))
    }

    /// Violation messages carried by a validation failure, empty otherwise.
    pub fn validation_errors(&self) -> &[String] {
        match self {
            Self::ValidationFailed { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Self::ValidationFailed { errors, .. } = self {
            value["errors"] = serde_json::json!(errors);
        }
        value
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
