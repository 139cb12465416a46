//! Repository layer: table-scoped database operations.

mod notification;
mod risk_report;

pub use notification::*;
pub use risk_report::*;
