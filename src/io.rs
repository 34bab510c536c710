//! Mesh input from external file formats.
pub mod msh;
