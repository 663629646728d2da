//! Errors raised while parsing, validating, running, or evaluating a script.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed script text.
    Parse,
    /// Script is well formed but references or values are inconsistent.
    Validation,
    /// The script design failed during simulation.
    Runtime,
    /// A query over simulation output could not be answered.
    Eval,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("unknown keyword '{0}'")]
    UnknownKeyword(String),

    #[error("invalid literal at offset {offset} in '{input}': {message}")]
    Literal {
        input: String,
        offset: usize,
        message: String,
    },

    #[error("run label '{0}' is duplicated")]
    DuplicateRunLabel(String),

    #[error("the property 'end' is required in @phase '{0}'")]
    MissingEnd(String),

    #[error("{0}")]
    Syntax(String),

    #[error("the parameter '{0}' is required")]
    MissingParameter(&'static str),

    #[error("unknown stimulus element '{name}' in {context}")]
    UnknownElement { name: String, context: String },

    #[error("unknown behavior '{name}' in {context}")]
    UnknownBehavior { name: String, context: String },

    #[error("unknown line label '{label}' in phase '{phase}'")]
    UnknownLine { label: String, phase: String },

    #[error("invalid phase label '{0}'")]
    UnknownPhase(String),

    #[error("unknown mechanism '{0}'")]
    UnknownMechanism(String),

    #[error("{0}")]
    Invalid(String),

    #[error("no condition in line '{line}' of phase '{phase}' was met for response '{response}'")]
    NoConditionMet {
        phase: String,
        line: String,
        response: String,
    },

    #[error("{0}")]
    Eval(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownKeyword(_)
            | Error::Literal { .. }
            | Error::DuplicateRunLabel(_)
            | Error::MissingEnd(_)
            | Error::Syntax(_) => ErrorKind::Parse,
            Error::MissingParameter(_)
            | Error::UnknownElement { .. }
            | Error::UnknownBehavior { .. }
            | Error::UnknownLine { .. }
            | Error::UnknownPhase(_)
            | Error::UnknownMechanism(_)
            | Error::Invalid(_) => ErrorKind::Validation,
            Error::NoConditionMet { .. } => ErrorKind::Runtime,
            Error::Eval(_) => ErrorKind::Eval,
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Error::Syntax(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Error::Eval(message.into())
    }
}
