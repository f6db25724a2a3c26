// Dochive - Preview Service Core
//
// This crate provides the preview-generation subsystem of the document
// sharing platform: the scheduler that turns non-previewable office
// documents into rendered artifacts by dispatching work to an external
// conversion backend, with durable job state and crash recovery.

pub mod common;
pub mod config;
pub mod kernel;

pub use config::*;
