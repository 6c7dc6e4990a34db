pub mod enums;
pub mod record;
pub mod sentinel;

pub use enums::*;
pub use record::*;
