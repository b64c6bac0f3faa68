pub mod event;
pub mod receipt;

pub use event::*;
pub use receipt::*;
