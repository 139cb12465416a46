pub mod invoker;
pub mod openai;
pub mod types;

pub use invoker::*;
pub use openai::*;
pub use types::*;

use thiserror::Error;

/// Failures talking to the chat-completion API. The message of the
/// underlying error is kept verbatim.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Inference API is not reachable at {url}: {message}")]
    Connection { url: String, message: String },

    #[error("Inference request timed out after {0}s")]
    Timeout(u64),

    #[error("Inference API returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Inference API reported an error: {0}")]
    Api(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Cannot decode inference response: {0}")]
    Decode(String),
}
