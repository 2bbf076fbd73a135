#![allow(clippy::needless_return)]

//! # Sinoflow
//!   Streaming task pipeline for tomographic image reconstruction
//!
//!   Tasks are nodes in a dataflow graph: each node declares the shape of its
//!   next output, consumes image buffers (projections, sinograms, slices) and
//!   either forwards a result right away or accumulates input across several
//!   calls before emitting.

/// Compute section of the library (buffers, kernels, dispatcher)
pub mod compute;

/// The contract every pipeline node implements
pub mod task;

/// The task collection
pub mod tasks;

/// Contains the most commonly used parts of the library
pub mod prelude {
    pub use crate::compute::buffer::*;
    pub use crate::compute::dispatcher::*;
    pub use crate::compute::kernel::*;
    pub use crate::task::*;
}
