pub mod config;
pub mod encode;
pub mod index;
pub mod table;

pub use config::*;
pub use encode::*;
pub use index::*;
pub use table::*;
