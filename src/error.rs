//! Error types and handling for the powder application

use thiserror::Error;

/// Main error type for the powder application
#[derive(Error, Debug)]
pub enum PowderError {
    /// Configuration-related errors (missing keys, bad values)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Weather, routing or geocoding API errors
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Requested data (fixtures, mountains) does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Language model call or output errors
    #[error("Language model error: {message}")]
    Llm { message: String },

    /// Mountain database errors
    #[error("Database error: {message}")]
    Database { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// General application errors
    #[error("Application error: {message}")]
    General { message: String },
}

impl PowderError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new language model error
    pub fn llm<S: Into<String>>(message: S) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a new database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new general error
    pub fn general<S: Into<String>>(message: S) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PowderError::Config { message } => {
                format!("Configuration error: {message}. Please check your config file and API keys.")
            }
            PowderError::Api { .. } => {
                "Unable to reach the weather or routing service. Please check your internet connection."
                    .to_string()
            }
            PowderError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            PowderError::NotFound { message } => message.clone(),
            PowderError::Llm { message } => {
                format!("The language model call failed: {message}")
            }
            PowderError::Database { .. } => {
                "Mountain database unavailable. Try `powder seed` to rebuild it.".to_string()
            }
            PowderError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
            PowderError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
            PowderError::General { message } => message.clone(),
        }
    }
}

impl From<rusqlite::Error> for PowderError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database(err.to_string())
    }
}
