/// Compute kernel
pub mod kernel;

/// Compute buffer
pub mod buffer;

/// Kernel dispatcher
pub mod dispatcher;
