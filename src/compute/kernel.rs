// A kernel is a method of running code on multiple threads
// Minimal and mostly read only data is exposed to allow for safety

/// Kernel input data
///
/// This is used to read / write data accurately
#[derive(Copy, Clone)]
pub struct KernelInput {
    /// X texel relative to the output buffer
    pub thread_x: usize,
    /// Y texel relative to the output buffer
    pub thread_y: usize,
    /// Z texel relative to the output buffer
    pub thread_z: usize,

    /// Width of output buffer
    pub buffer_width: usize,
    /// Height of output buffer
    pub buffer_height: usize,
    /// Depth of output buffer
    pub buffer_depth: usize,
}

/// A Kernel used for distributed computation
///
/// Kernels provide an abstraction layer over per-element operations, safely
/// distributing a workload across multiple threads. The kernel reads whatever
/// inputs it captured at construction time and returns the value for the
/// output element addressed by `input`.
pub trait Kernel: Sync {
    /// Kernel execution function
    fn kernel_exec(&self, input: KernelInput) -> f32;
}
