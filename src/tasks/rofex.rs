//! Tasks shaped around the ROFEX ultrafast electron-beam CT geometry:
//! multiple detector modules arranged in half rings, several measurement
//! planes, and a continuous stream of frames per plane.

/// Raw detector RAM buffering
pub mod dummy_ram;

/// Module/projection axis reordering
pub mod reorder;

/// Fan beam to parallel beam resampling
pub mod fan2para;

/// Sinogram assembly from module chunks
pub mod make_sinogram;

/// Regrouping of plane-tagged frames into stacks
pub mod group_slices;

/// Splitting stacks into single slices
pub mod slice;

/// Reference measurement correction
pub mod correct_ref;

/// Maps the number of already produced outputs onto the (frame, plane)
/// pair of the next one; planes cycle fastest.
pub(crate) fn frame_plane(produced: usize, n_planes: usize) -> (usize, usize) {
    return (produced / n_planes, produced % n_planes);
}
