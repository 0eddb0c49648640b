//! Core type definitions used across the Herald workspace.

pub mod id;

pub use id::*;
