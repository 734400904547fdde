/// Core error type for the contact converter.
///
/// Adapter crates map their failures into this type so the session layer can
/// decide per variant whether to re-prompt, roll back to the source step, or
/// report a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input for the current step. Re-prompt, nothing is applied.
    #[error("{0}")]
    Validation(String),

    /// An upload parsed into zero contacts.
    #[error("no phone numbers found in the uploaded source")]
    EmptySource,

    #[error("permission denied")]
    PermissionDenied,

    /// The owner identity can never be granted, demoted or revoked.
    #[error("the owner cannot be modified")]
    OwnerProtected,

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File store / access store failure. The session stays where it was.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Errors the user can fix by sending different input for the same step.
    pub fn is_recoverable_input(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::UnsupportedFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
