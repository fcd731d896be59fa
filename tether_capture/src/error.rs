use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config line {line} is not a key=value pair: {content:?}")]
    ConfigSyntax { line: usize, content: String },

    #[error("Config keys do not match the {profile} profile (missing: {missing:?}, unexpected: {unexpected:?})")]
    ConfigKeys {
        profile: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Invalid value {value:?} for config key {key}: {reason}")]
    ConfigValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Malformed row {line} in parameter table {}: {content:?}", path.display())]
    Table {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Camera driver error: {0}")]
    Driver(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Camera {0} not found by auto-detect")]
    CameraNotFound(String),

    #[error("Camera is not in bulb mode (shutterspeed reports {0:?}), fix on the camera before running")]
    NotInBulbMode(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Logger error: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),

    #[error("Could not install the stop signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
