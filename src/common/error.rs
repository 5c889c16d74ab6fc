use thiserror::Error;

use crate::schema::element::MergeError;

/// Result type for nbtex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the analyzer
///
/// Fatal analysis errors carry the class, method and program counter of the
/// offending site so a failed run names the bytecode it choked on. A class
/// that simply cannot be found is not an error; the loader reports it as
/// absent and the memoizer degrades to a pass-through call result.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("malformed class {class}: {message}")]
    MalformedClass { class: String, message: String },

    #[error("malformed stack map frame in {class}.{method}: frame type {frame_type}")]
    MalformedFrame {
        class: String,
        method: String,
        frame_type: u8,
    },

    #[error("virtual resolution of {class}.{name}{descriptor} found no target")]
    VirtualResolution {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("generic entry into pinned method {class}.{name} from {caller} at pc {pc}")]
    UnsafeReentry {
        class: String,
        name: String,
        caller: String,
        pc: u32,
    },

    #[error("schema merge failed in {class}.{method} at pc {pc}: {source}")]
    SchemaMergeFailure {
        class: String,
        method: String,
        pc: u32,
        source: MergeError,
    },

    #[error("interpreter error in {class}.{method} at pc {pc}: {message}")]
    Interpreter {
        class: String,
        method: String,
        pc: u32,
        message: String,
    },

    #[error("invariant broken: {message}")]
    InvariantBroken { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a malformed-class error
    pub fn malformed(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedClass {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Create an invariant-broken error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantBroken {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
