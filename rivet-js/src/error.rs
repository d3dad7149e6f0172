//! JavaScript error types.

use core::fmt;

use crate::value::Value;

/// Result type for JavaScript operations.
pub type JsResult<T> = Result<T, JsError>;

/// JavaScript error types.
#[derive(Debug, Clone)]
pub enum JsError {
    /// Syntax error during lexing or parsing.
    SyntaxError(String),
    /// Type error during execution.
    TypeError(String),
    /// Reference error (undefined variable).
    ReferenceError(String),
    /// Range error (out-of-range index, call stack overflow, etc.).
    RangeError(String),
    /// An error raised by embedder code called from script.
    HostError(String),
    /// A value thrown by a `throw` statement.
    Thrown(Value),
}

impl JsError {
    /// Create a syntax error.
    pub fn syntax<S: Into<String>>(msg: S) -> Self {
        JsError::SyntaxError(msg.into())
    }

    /// Create a type error.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        JsError::TypeError(msg.into())
    }

    /// Create a reference error.
    pub fn reference<S: Into<String>>(msg: S) -> Self {
        JsError::ReferenceError(msg.into())
    }

    /// Create a range error.
    pub fn range<S: Into<String>>(msg: S) -> Self {
        JsError::RangeError(msg.into())
    }

    /// Create an error carrying an embedder failure.
    pub fn host<S: Into<String>>(msg: S) -> Self {
        JsError::HostError(msg.into())
    }

    /// Get error name.
    pub fn name(&self) -> &'static str {
        match self {
            JsError::SyntaxError(_) => "SyntaxError",
            JsError::TypeError(_) => "TypeError",
            JsError::ReferenceError(_) => "ReferenceError",
            JsError::RangeError(_) => "RangeError",
            JsError::HostError(_) => "HostError",
            JsError::Thrown(_) => "Error",
        }
    }

    /// Get error message.
    pub fn message(&self) -> String {
        match self {
            JsError::SyntaxError(msg)
            | JsError::TypeError(msg)
            | JsError::ReferenceError(msg)
            | JsError::RangeError(msg)
            | JsError::HostError(msg) => msg.clone(),
            JsError::Thrown(value) => {
                if let Some((name, message)) = value.error_parts() {
                    return format!("{}: {}", name, message);
                }
                value.to_display_string()
            }
        }
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsError::Thrown(_) => write!(f, "{}", self.message()),
            _ => write!(f, "{}: {}", self.name(), self.message()),
        }
    }
}
