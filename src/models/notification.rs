use serde::{Deserialize, Serialize};

/// Outbound message announcing a stored report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    /// Plain text; a pretty-printed JSON dump of the report without its image.
    pub body: String,
}
