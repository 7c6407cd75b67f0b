pub mod commands;
pub mod events;
pub mod info;

pub use commands::*;
pub use events::*;
pub use info::*;
