use clipshare_core::{ContentHashError, SyncError};

/// Errors from board commands
#[derive(Debug)]
pub enum CommandError {
    SyncError(SyncError),
    IoError(std::io::Error),
    InvalidHash(ContentHashError),
    /// The push channel gave up before the board arrived
    Unreachable(String),
    NotFound(String),
    Ambiguous(String, usize),
    NotAFile(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SyncError(e) => write!(f, "{}", e),
            CommandError::IoError(e) => write!(f, "{}", e),
            CommandError::InvalidHash(e) => write!(f, "{}", e),
            CommandError::Unreachable(url) => write!(f, "Server unreachable: {}", url),
            CommandError::NotFound(prefix) => write!(f, "No item matches '{}'", prefix),
            CommandError::Ambiguous(prefix, count) => {
                write!(f, "'{}' matches {} items, use a longer prefix", prefix, count)
            }
            CommandError::NotAFile(prefix) => write!(f, "Item '{}' is not a file", prefix),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SyncError(e) => Some(e),
            CommandError::IoError(e) => Some(e),
            CommandError::InvalidHash(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::SyncError(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::IoError(e)
    }
}

impl From<ContentHashError> for CommandError {
    fn from(e: ContentHashError) -> Self {
        CommandError::InvalidHash(e)
    }
}
