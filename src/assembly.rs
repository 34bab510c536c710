//! Element-level evaluation and global sparse assembly.
pub mod global;
pub mod local;
