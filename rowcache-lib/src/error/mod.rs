//! Error types

mod field;
mod session;
mod source;

pub use field::*;
pub use session::*;
pub use source::*;
