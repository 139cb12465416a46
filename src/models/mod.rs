pub mod enums;
pub mod notification;
pub mod risk;

pub use enums::*;
pub use notification::*;
pub use risk::*;
