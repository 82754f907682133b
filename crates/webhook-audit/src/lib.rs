pub mod audit_log;
pub mod cursor;
pub mod error;
pub mod event;

pub use audit_log::*;
pub use cursor::*;
pub use error::*;
pub use event::*;
