//! Shared types for the classck workspace.

pub mod loc;

pub use loc::{LineIndex, SourceLoc};
