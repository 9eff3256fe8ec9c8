//! Kernel dispatch surface.
//!
//! Only the dispatcher and its result envelope are public from here.

pub mod dispatcher;
pub mod envelope;

pub use dispatcher::{Kernel, KernelStatus, KERNEL_VERSION};
pub use envelope::ExecutionResult;
