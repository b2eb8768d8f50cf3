use kiln_core::{config::AppConfig, manager::ManagerError, runtime::RuntimeError};
use std::{fmt, path::Path};

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Io(String),
    Render(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Render(msg) => write!(f, "Render error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<ManagerError> for CliError {
    fn from(error: ManagerError) -> Self {
        Self::Render(error.to_string())
    }
}

impl From<RuntimeError> for CliError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::ConfigValidation(msg) => Self::Config(msg),
            other => Self::Render(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Loads `file` with environment overrides applied. A missing file is an error here, unlike
/// in the server where compiled defaults are used.
pub fn load_config(file: &str) -> CliResult<AppConfig> {
    if !Path::new(file).exists() {
        return Err(CliError::Config(format!("File not found: {file}")));
    }
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}
