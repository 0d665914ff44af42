//! Error types for the host runtime and the binding layer.
//!
//! The runtime has a single error-signaling channel: every failure is a
//! [`RuntimeError`] returned through `Result` and propagated with `?` out of
//! the current call chain. Nothing is reported through in-band sentinel
//! values, and nothing is retried.
//!
//! ## Error Hierarchy
//!
//! ```text
//! RuntimeError
//! ├── ClassNotRegistered   - wrap attempted before the class was committed
//! ├── TypeMismatch         - argument is not a handle of the expected class
//! ├── Construction         - native constructor rejected its arguments
//! ├── ObjectDestroyed      - dispatch against an already destroyed object
//! ├── ObjectBorrowed       - reentrant dispatch on the same object
//! ├── NotCallable / NotIndexable / MissingMethod - call protocol violations
//! ├── StackOverflow        - stack or call depth exhausted
//! ├── ArgumentOutOfBounds / Conversion - primitive argument reads
//! ├── InvalidResultCount   - native function reported more results than it pushed
//! ├── StaleHandle          - reference to a collected object
//! └── Message              - native-code-defined error
//! ```

use thiserror::Error;

/// Errors raised while converting a runtime value to a native primitive.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The value has a different runtime type.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// An integer does not fit the target type.
    #[error("integer overflow: {value} doesn't fit in {target_type}")]
    IntegerOverflow {
        value: i64,
        target_type: &'static str,
    },

    /// A float has a fractional part and cannot become an integer.
    #[error("number {value} has no integer representation")]
    NotAnInteger { value: f64 },
}

impl ConversionError {
    /// The expected type name.
    pub fn expected(&self) -> &'static str {
        match self {
            ConversionError::TypeMismatch { expected, .. } => *expected,
            ConversionError::IntegerOverflow { target_type, .. } => *target_type,
            ConversionError::NotAnInteger { .. } => "integer",
        }
    }
}

/// Errors signaled by the runtime, the bridge, or native methods.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A native object was wrapped before its class was committed.
    #[error("class {class} has not been committed")]
    ClassNotRegistered { class: String },

    /// An argument is not a handle of the expected class.
    #[error("bad argument #{position} ({expected} expected, got {actual})")]
    TypeMismatch {
        position: usize,
        expected: String,
        actual: String,
    },

    /// The native constructor failed.
    #[error("cannot construct {class}: {message}")]
    Construction { class: String, message: String },

    /// The native object behind a handle was already destroyed.
    #[error("{class} object has already been destroyed")]
    ObjectDestroyed { class: String },

    /// The native object is already mutably borrowed by an outer call.
    #[error("{class} object is already in use by another call")]
    ObjectBorrowed { class: String },

    /// Attempted to call a value that is not callable.
    #[error("attempt to call a {type_name} value")]
    NotCallable { type_name: &'static str },

    /// Attempted to index a value that has no fields.
    #[error("attempt to index a {type_name} value")]
    NotIndexable { type_name: &'static str },

    /// A method lookup on a receiver found nothing.
    #[error("attempt to call missing method '{method}' on a {type_name} value")]
    MissingMethod {
        method: String,
        type_name: &'static str,
    },

    /// The value stack or the native call depth is exhausted.
    #[error("stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    /// An argument position past the end of the call frame.
    #[error("bad argument #{index} (frame has {count} arguments)")]
    ArgumentOutOfBounds { index: usize, count: usize },

    /// A primitive argument has the wrong type.
    #[error("bad argument #{position}: {source}")]
    Conversion {
        position: usize,
        #[source]
        source: ConversionError,
    },

    /// A native function reported more results than it pushed.
    #[error("native function reported {reported} results but only {available} are on the stack")]
    InvalidResultCount { reported: usize, available: usize },

    /// A reference to an object the collector has already freed.
    #[error("stale handle: object at index {index} has been freed")]
    StaleHandle { index: u32 },

    /// A native-code-defined error.
    #[error("{0}")]
    Message(String),
}

impl RuntimeError {
    /// Create a native-code-defined error.
    pub fn message(message: impl Into<String>) -> Self {
        RuntimeError::Message(message.into())
    }

    /// Create a type mismatch error for an argument position.
    pub fn type_mismatch(
        position: usize,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        RuntimeError::TypeMismatch {
            position,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
