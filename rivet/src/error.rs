//! Boundary-layer error types.

use std::fmt;
use std::path::PathBuf;
use std::thread::ThreadId;

use rivet_js::JsError;

/// Result type for boundary operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the host by context and proxy operations.
#[derive(Debug, Clone)]
pub enum Error {
    /// A failure originating in or surfaced through the script engine:
    /// syntax errors, thrown script exceptions, host exceptions propagated
    /// through a script call, rejected construction, out-of-range writes.
    Js {
        /// Human-readable message.
        message: String,
    },
    /// A host integer too large to represent exactly as a double.
    Overflow {
        /// The offending value.
        value: i64,
    },
    /// A context or proxy was used from a thread other than the one that
    /// created its context.
    WrongThread {
        /// The thread the context belongs to.
        owner: ThreadId,
        /// The thread that made the call.
        caller: ThreadId,
    },
    /// The context has been destroyed; the handle is permanently invalid.
    ContextDestroyed,
    /// A property, attribute, or index was not found. Value-level and
    /// non-fatal; distinguishes a miss from a script error.
    NotFound {
        /// The missing key.
        name: String,
    },
    /// A script file or module source could not be resolved.
    File {
        /// The path that failed to resolve.
        path: PathBuf,
    },
}

impl Error {
    /// Create a script error.
    pub fn js<S: Into<String>>(message: S) -> Self {
        Error::Js {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Error::NotFound { name: name.into() }
    }

    pub(crate) fn wrong_thread(owner: ThreadId, caller: ThreadId) -> Self {
        Error::WrongThread { owner, caller }
    }

    /// Whether this is a script-originated error.
    pub fn is_js(&self) -> bool {
        matches!(self, Error::Js { .. })
    }

    /// Whether this is a value-level miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Js { message } => write!(f, "{}", message),
            Error::Overflow { value } => write!(
                f,
                "integer {} cannot be represented exactly as a double",
                value
            ),
            Error::WrongThread { owner, caller } => write!(
                f,
                "context is bound to {:?} but was used from {:?}",
                owner, caller
            ),
            Error::ContextDestroyed => write!(f, "context destroyed"),
            Error::NotFound { name } => write!(f, "{} not found", name),
            Error::File { path } => write!(f, "no script file at {}", path.display()),
        }
    }
}

impl std::error::Error for Error {}

impl From<JsError> for Error {
    fn from(err: JsError) -> Self {
        Error::Js {
            message: err.to_string(),
        }
    }
}
