//! Execution engine for terrace
//!
//! The engine orchestrates:
//! 1. Loading - Build the workspace from the Terracefile
//! 2. Previewing - Dry-run the goal and show the planned actions
//! 3. Executing - Converge the selected resources in dependency order

pub mod differ;
pub mod runner;

pub use runner::run;
