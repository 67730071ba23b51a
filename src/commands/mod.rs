//! Command implementations
//!
//! Each command is a module with an execute function that takes parsed
//! arguments and runs the operation against a store.

pub mod cat;
pub mod locks;
pub mod logs;
pub mod size;
pub mod tags;
pub mod versions;

// Re-export execute functions for convenience
pub use cat::execute as cat;
pub use logs::execute as logs;
pub use size::execute as size;
pub use versions::execute as versions;
