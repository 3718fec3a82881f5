use thiserror::Error;

/// Unified error type for the entire budget-client-core library.
/// Every public function returns `Result<T, CoreError>`.
///
/// `Clone` so that callers joining a single in-flight fetch can all
/// receive the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Remote API ──────────────────────────────────────────────────
    #[error("Unauthorized — credential missing or expired, please log in again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    // ── Client-side checks ──────────────────────────────────────────
    #[error("Invalid month index: {0} (expected 0..=11)")]
    InvalidMonth(i64),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Export failed: {0}")]
    Export(String),

    // ── Credential vault ────────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported file version: {0}")]
    UnsupportedVersion(u16),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed — wrong password or corrupted file")]
    Decryption,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),
}

impl CoreError {
    /// Failures that an explicit user-triggered refresh may fix.
    /// Nothing in this crate retries automatically.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Network(_) | CoreError::ServerError { .. })
    }

    /// The user has to log in again before anything else will succeed.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, CoreError::Unauthorized)
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Malformed(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL; strip the query so month
        // parameters and anything else appended never reach the logs.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        if e.is_decode() {
            CoreError::Malformed(sanitized)
        } else {
            CoreError::Network(sanitized)
        }
    }
}

impl From<aes_gcm::Error> for CoreError {
    fn from(_: aes_gcm::Error) -> Self {
        CoreError::Decryption
    }
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        CoreError::Export(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for CoreError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        CoreError::Export(e.to_string())
    }
}
