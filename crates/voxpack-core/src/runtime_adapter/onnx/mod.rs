//! ONNX Runtime implementation of [`ModelRuntime`](super::ModelRuntime).
//!
//! - `OnnxRuntime`: loads model bytes and commits sessions from memory
//! - `OnnxContext`: a committed session bound to one backend

mod runtime;

pub use runtime::{OnnxContext, OnnxRuntime};
