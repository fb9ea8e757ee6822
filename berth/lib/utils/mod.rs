//! Utility functions and types.

mod env;
mod file;
mod ident;
pub mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use file::*;
pub use ident::*;
pub use path::*;
