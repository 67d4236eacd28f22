use std::path::PathBuf;

/// Errors raised by the render / diff / reconcile pipeline.
///
/// Every variant that concerns a single device carries its hostname so the
/// CLI can report which device failed without extra bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured input could not be parsed or failed validation
    #[error("malformed data in {source_name}: {message}")]
    DataFormat { source_name: String, message: String },

    /// A referenced device, template or data key does not exist
    #[error("{resource} not found: {key}")]
    NotFound { resource: String, key: String },

    /// A template referenced a variable that is absent from the render context
    #[error("undefined variable `{variable}` while rendering {device}")]
    UndefinedVariable { device: String, variable: String },

    /// A VLAN field that must be numeric was not
    #[error("{device}: {field} must be an integer, got {value:?}")]
    TypeConversion {
        device: String,
        field: String,
        value: String,
    },

    /// Template failed to parse, or failed to render for a reason other than
    /// an undefined variable
    #[error("template {name}: {message}")]
    Template { name: String, message: String },

    /// The device could not be reached or refused authentication
    #[error("{device}: connectivity error: {message}")]
    Connectivity { device: String, message: String },

    /// The device rejected (part of) the pushed command set, or the save failed
    #[error("{device}: push failed: {message}")]
    PushFailure { device: String, message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn data_format(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::DataFormat {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(resource: &str, key: &str) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
            key: key.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short stable name of the failure class, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DataFormat { .. } => "data-format",
            Error::NotFound { .. } => "not-found",
            Error::UndefinedVariable { .. } => "undefined-variable",
            Error::TypeConversion { .. } => "type-conversion",
            Error::Template { .. } => "template",
            Error::Connectivity { .. } => "connectivity",
            Error::PushFailure { .. } => "push-failure",
            Error::Io { .. } => "io",
        }
    }
}
