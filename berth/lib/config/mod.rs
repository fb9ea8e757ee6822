//! Configuration types: settings, deploy options, and compose manifest model.

mod compose;
mod install;
mod pairs;
mod settings;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use compose::*;
pub use install::*;
pub use pairs::*;
pub use settings::*;
