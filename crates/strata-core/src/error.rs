use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    // Reasoning backend errors
    #[error("Reasoning request failed: {0}")]
    Reasoning(String),

    #[error("Reasoning response parse error: {0}")]
    ReasoningParse(String),

    #[error("All credentials exhausted after {attempts} attempt(s): {last_error}")]
    CredentialsExhausted { attempts: u32, last_error: String },

    // Registry errors
    #[error("Specialist already registered: {0}")]
    DuplicateSpecialist(String),

    #[error("Specialist not found: {0}")]
    SpecialistNotFound(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StrataError>;
