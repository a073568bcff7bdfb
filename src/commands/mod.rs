mod board;
mod config_cmd;
mod error;
mod share;
mod status;
mod watch;

pub use board::{DeleteCommand, DownloadCommand, ListCommand};
pub use config_cmd::ConfigCommand;
pub use error::CommandError;
pub use share::{SendCommand, UploadCommand};
pub use status::StatusCommand;
pub use watch::WatchCommand;
