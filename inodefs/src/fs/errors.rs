use thiserror::Error;

/// Coarse failure classes. Only visible in logs and metrics; the wire
/// protocol collapses all of them to a `-1` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    StoreError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::StoreError => "store_error",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("entry already exists")]
    Exists,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("file too large")]
    FileTooLarge,
    #[error("name too long")]
    NameTooLong,
    #[error("too many links")]
    TooManyLinks,
    #[error("no inode ids left for tenant")]
    NoSpace,
    #[error("corrupt record in store")]
    InvalidData,
    #[error("store I/O error")]
    IoError,
}

impl FsError {
    pub fn kind(self) -> ErrorKind {
        match self {
            FsError::NotFound => ErrorKind::NotFound,
            FsError::Exists
            | FsError::IsDirectory
            | FsError::NotDirectory
            | FsError::NotEmpty
            | FsError::TooManyLinks => ErrorKind::Conflict,
            FsError::InvalidArgument | FsError::NameTooLong | FsError::FileTooLarge => {
                ErrorKind::InvalidArgument
            }
            FsError::NoSpace | FsError::InvalidData | FsError::IoError => ErrorKind::StoreError,
        }
    }
}

impl From<Box<bincode::ErrorKind>> for FsError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        tracing::error!("Failed to serialize record: {:?}", e);
        FsError::InvalidData
    }
}
