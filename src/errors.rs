use thiserror::Error;

/// Broad classification of a [`RollupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller wired something up wrong (constructor arguments, comparator fields, find criteria, settings).
    Configuration,
    /// A grouping expression could not be parsed or evaluated against an item.
    Expression,
    /// An operation was invoked on a node of the wrong shape (leaf vs internal).
    Structural,
}

#[derive(Error, Debug)]
pub enum RollupError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("field '{field}' is not exposed by {record}")]
    MissingField { field: String, record: String },

    #[error("settings error: {message}")]
    Settings { message: String },

    #[error("invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("expression '{expression}': no field or method '{segment}' on {target}")]
    UnknownSegment {
        expression: String,
        segment: String,
        target: String,
    },

    #[error("expression '{expression}': {reason}")]
    Evaluation { expression: String, reason: String },

    #[error("structural error: {0}")]
    Structural(String),
}

impl RollupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::MissingField { .. } | Self::Settings { .. } => {
                ErrorKind::Configuration
            }
            Self::InvalidExpression { .. } | Self::UnknownSegment { .. } | Self::Evaluation { .. } => {
                ErrorKind::Expression
            }
            Self::Structural(_) => ErrorKind::Structural,
        }
    }

    pub(crate) fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type RollupResult<T> = Result<T, RollupError>;
