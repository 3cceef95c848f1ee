//! Domain types of the dispatch layer

pub mod decoded;
pub mod duties;
pub mod partial_sig;

pub use decoded::*;
pub use duties::*;
pub use partial_sig::*;
