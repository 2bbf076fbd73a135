#[cfg(feature = "serialization")]
use bincode::serialize_into;

#[cfg(feature = "serialization")]
use serde::Serialize;

#[cfg(feature = "serialization")]
use std::{fs::File, io::BufWriter, path::Path};

#[cfg(feature = "image")]
use image::{GrayImage, Luma};

#[cfg(all(feature = "image", not(feature = "serialization")))]
use std::path::Path;

/// Declared shape of a buffer: one to three dimensions, axis 0 fastest
#[cfg_attr(feature = "serialization", derive(Serialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requisition {
    _dims: Vec<usize>,
}

impl Requisition {
    pub fn new_1d(width: usize) -> Self {
        return Self { _dims: vec![width] };
    }

    pub fn new_2d(width: usize, height: usize) -> Self {
        return Self { _dims: vec![width, height] };
    }

    pub fn new_3d(width: usize, height: usize, depth: usize) -> Self {
        return Self { _dims: vec![width, height, depth] };
    }

    pub fn n_dims(&self) -> usize {
        return self._dims.len();
    }

    pub fn dims(&self) -> &[usize] {
        return &self._dims;
    }

    pub fn width(&self) -> usize {
        return self._dims[0];
    }

    /// Height of the shape (1 for 1-D shapes)
    pub fn height(&self) -> usize {
        return self._dims.get(1).copied().unwrap_or(1);
    }

    /// Depth of the shape (1 for 1-D and 2-D shapes)
    pub fn depth(&self) -> usize {
        return self._dims.get(2).copied().unwrap_or(1);
    }

    /// Total number of elements described by this shape
    pub fn len(&self) -> usize {
        return self._dims.iter().product();
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }
}

/// A scalar result attached to a buffer without disturbing its payload,
/// e.g. the value computed by a reduction
#[cfg_attr(feature = "serialization", derive(Serialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarTag {
    pub label: &'static str,
    pub value: f32,
}

/// An n-dimensional array of single precision floats with typed metadata
///
/// The payload length always equals the product of the shape's dimensions.
/// `plane_index` identifies which acquisition plane a sinogram belongs to and
/// is propagated by the pipeline stages that split or regroup plane data.
#[cfg_attr(feature = "serialization", derive(Serialize))]
#[derive(Clone, Debug)]
pub struct Buffer {
    _backing: Vec<f32>,
    _shape: Requisition,
    _plane_index: Option<u32>,
    _scalar: Option<ScalarTag>,
}

impl Buffer {
    /// Creates a zero-filled buffer of the given shape
    pub fn new(shape: Requisition) -> Self {
        return Self {
            _backing: vec![0.0; shape.len()],
            _shape: shape,
            _plane_index: None,
            _scalar: None,
        };
    }

    /// Wraps existing data; the data length must match the shape
    pub fn from_vec(shape: Requisition, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), shape.len());
        return Self {
            _backing: data,
            _shape: shape,
            _plane_index: None,
            _scalar: None,
        };
    }

    pub fn requisition(&self) -> &Requisition {
        return &self._shape;
    }

    pub fn len(&self) -> usize {
        return self._backing.len();
    }

    pub fn is_empty(&self) -> bool {
        return self._backing.is_empty();
    }

    /// Read-only view of the payload
    pub fn host(&self) -> &[f32] {
        return &self._backing;
    }

    /// Mutable view of the payload
    pub fn host_mut(&mut self) -> &mut [f32] {
        return &mut self._backing;
    }

    /// Private duplicate for tasks that retain data across calls while
    /// handing the original buffer back immediately
    pub fn dup(&self) -> Buffer {
        return self.clone();
    }

    pub fn copy_metadata_from(&mut self, other: &Buffer) {
        self._plane_index = other._plane_index;
        self._scalar = other._scalar;
    }

    pub fn plane_index(&self) -> Option<u32> {
        return self._plane_index;
    }

    pub fn set_plane_index(&mut self, plane_index: Option<u32>) {
        self._plane_index = plane_index;
    }

    pub fn scalar(&self) -> Option<ScalarTag> {
        return self._scalar;
    }

    pub fn set_scalar(&mut self, scalar: ScalarTag) {
        self._scalar = Some(scalar);
    }

    fn coord_to_index(&self, x: usize, y: usize, z: usize) -> usize {
        let width = self._shape.width();
        let height = self._shape.height();
        return x + (y * width) + (z * width * height);
    }

    pub fn read(&self, x: usize, y: usize, z: usize) -> f32 {
        let index = self.coord_to_index(x, y, z);
        assert!(index < self._backing.len());
        return self._backing[index];
    }

    pub fn write(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let index = self.coord_to_index(x, y, z);
        assert!(index < self._backing.len());
        self._backing[index] = value;
    }

    /// Saves this buffer to disk
    #[cfg(feature = "serialization")]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serialize_into(&mut writer, self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        return Ok(());
    }

    /// Saves this buffer as a grayscale image, 3-D buffers are laid out with
    /// their slices side by side
    #[cfg(feature = "image")]
    pub fn save_as_image<P: AsRef<Path>>(&self, path: P) -> image::ImageResult<()> {
        let width = self._shape.width();
        let height = self._shape.height();
        let depth = self._shape.depth();

        let peak = self
            ._backing
            .iter()
            .copied()
            .fold(0.0f32, f32::max)
            .max(f32::EPSILON);

        let mut image = GrayImage::new((width * depth) as u32, height as u32);

        for z in 0..depth {
            let shift = z * width;
            for x in 0..width {
                for y in 0..height {
                    let raw = self.read(x, y, z);
                    let level = ((raw / peak).clamp(0.0, 1.0) * 255.0).round() as u8;
                    image.put_pixel((x + shift) as u32, y as u32, Luma([level]));
                }
            }
        }

        return image.save(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requisition_extents_default_to_one() {
        let req = Requisition::new_1d(8);
        assert_eq!(req.width(), 8);
        assert_eq!(req.height(), 1);
        assert_eq!(req.depth(), 1);
        assert_eq!(req.len(), 8);

        let req = Requisition::new_3d(4, 3, 2);
        assert_eq!(req.len(), 24);
        assert_eq!(req.dims(), &[4, 3, 2]);
    }

    #[test]
    fn buffer_read_write_is_row_major() {
        let mut buffer = Buffer::new(Requisition::new_3d(4, 3, 2));
        buffer.write(1, 2, 1, 7.0);
        assert_eq!(buffer.read(1, 2, 1), 7.0);
        assert_eq!(buffer.host()[1 + 2 * 4 + 1 * 12], 7.0);
    }

    #[test]
    fn dup_carries_metadata() {
        let mut buffer = Buffer::new(Requisition::new_2d(2, 2));
        buffer.set_plane_index(Some(3));
        let copy = buffer.dup();
        assert_eq!(copy.plane_index(), Some(3));
        assert_eq!(copy.host(), buffer.host());
    }
}
