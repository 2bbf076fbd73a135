use crate::prelude::*;
use crate::tasks::rofex::frame_plane;

/// Undoes the module-major ordering the detector RAM delivers
///
/// The RAM dump interleaves whole modules: for every (frame, plane) slice
/// the data holds module 0's projections, then module 1's, and so on. The
/// downstream stages want one detector ring per projection instead. Each
/// emitted frame is a 2-D sinogram of the full ring, tagged with its plane.
pub struct ReorderTask {
    _n_modules: usize,
    _n_planes: usize,

    _retained: Option<Buffer>,
    _produced: usize,
}

/// Scatters one full-ring sinogram back into the module-major layout the
/// detector RAM produces. Inverse of the reorder permutation.
pub fn interleave_modules(ring: &[f32], n_modules: usize, n_det_pm: usize, n_proj: usize) -> Vec<f32> {
    let mut out = vec![0.0; ring.len()];

    for module in 0..n_modules {
        for proj in 0..n_proj {
            for det in 0..n_det_pm {
                out[(module * n_proj + proj) * n_det_pm + det] =
                    ring[(proj * n_modules + module) * n_det_pm + det];
            }
        }
    }

    return out;
}

impl ReorderTask {
    pub fn new(n_modules: usize, n_planes: usize) -> Result<ReorderTask, TaskError> {
        if n_modules == 0 || n_planes == 0 {
            return Err(TaskError::Config(
                "module and plane counts must be positive".to_string(),
            ));
        }

        return Ok(ReorderTask {
            _n_modules: n_modules,
            _n_planes: n_planes,
            _retained: None,
            _produced: 0,
        });
    }

    fn check_geometry(&self, input: &Requisition) -> Result<(), TaskError> {
        if input.width() % self._n_modules != 0 {
            return Err(TaskError::Geometry(format!(
                "detector count {} is not divisible by {} modules",
                input.width(),
                self._n_modules
            )));
        }

        if input.depth() % self._n_planes != 0 {
            return Err(TaskError::Geometry(format!(
                "stack depth {} is not divisible by {} planes",
                input.depth(),
                self._n_planes
            )));
        }

        return Ok(());
    }
}

impl Task for ReorderTask {
    fn mode(&self) -> TaskMode {
        return TaskMode::Reductor;
    }

    fn num_dimensions(&self, _input: usize) -> Option<usize> {
        return Some(3);
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let input = inputs[0].requisition();
        self.check_geometry(input)?;
        return Ok(Requisition::new_2d(input.width(), input.height()));
    }

    fn process(&mut self, inputs: &[&Buffer], _output: &mut Buffer) -> Result<bool, TaskError> {
        self.check_geometry(inputs[0].requisition())?;
        self._retained = Some(inputs[0].dup());
        self._produced = 0;
        return Ok(false);
    }

    fn generate(&mut self, output: &mut Buffer) -> Result<bool, TaskError> {
        let retained = match &self._retained {
            Some(retained) => retained,
            None => return Ok(false),
        };

        if self._produced == retained.requisition().depth() {
            self._retained = None;
            self._produced = 0;
            return Ok(false);
        }

        let n_dets = retained.requisition().width();
        let n_proj = retained.requisition().height();
        let n_det_pm = n_dets / self._n_modules;

        let (frame, plane) = frame_plane(self._produced, self._n_planes);
        let slice_offset = (frame * self._n_planes + plane) * n_dets * n_proj;

        let src = &retained.host()[slice_offset..slice_offset + n_dets * n_proj];
        let dst = output.host_mut();

        for module in 0..self._n_modules {
            for proj in 0..n_proj {
                let from = (module * n_proj + proj) * n_det_pm;
                let to = (proj * self._n_modules + module) * n_det_pm;
                dst[to..to + n_det_pm].copy_from_slice(&src[from..from + n_det_pm]);
            }
        }

        output.set_plane_index(Some(plane as u32));
        self._produced += 1;

        return Ok(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(n_modules: usize, n_det_pm: usize, n_proj: usize, n_planes: usize, n_frames: usize) {
        let n_dets = n_modules * n_det_pm;
        let slice_len = n_dets * n_proj;
        let data: Vec<f32> = (0..slice_len * n_planes * n_frames)
            .map(|i| i as f32)
            .collect();
        let input = Buffer::from_vec(
            Requisition::new_3d(n_dets, n_proj, n_planes * n_frames),
            data.clone(),
        );

        let resources = Resources::new(0);
        let mut task = ReorderTask::new(n_modules, n_planes).unwrap();
        let outputs = drive(&mut task, &resources, &[vec![input]]).unwrap();

        assert_eq!(outputs.len(), n_planes * n_frames);

        for (index, ring) in outputs.iter().enumerate() {
            assert_eq!(ring.requisition().dims(), &[n_dets, n_proj]);
            assert_eq!(ring.plane_index(), Some((index % n_planes) as u32));

            let back = interleave_modules(ring.host(), n_modules, n_det_pm, n_proj);
            assert_eq!(back, data[index * slice_len..(index + 1) * slice_len]);
        }
    }

    #[test]
    fn round_trips_through_the_inverse() {
        round_trip(3, 4, 5, 2, 2);
        round_trip(1, 1, 1, 1, 1);
        round_trip(1, 6, 3, 2, 1);
        round_trip(4, 1, 2, 1, 3);
        round_trip(2, 3, 1, 3, 2);
    }

    #[test]
    fn indivisible_geometry_is_rejected() {
        let mut task = ReorderTask::new(3, 2).unwrap();

        let odd_dets = Buffer::new(Requisition::new_3d(7, 4, 2));
        let err = task.get_requisition(&[&odd_dets]).unwrap_err();
        assert!(matches!(err, TaskError::Geometry(_)));

        let odd_depth = Buffer::new(Requisition::new_3d(6, 4, 3));
        let err = task.get_requisition(&[&odd_depth]).unwrap_err();
        assert!(matches!(err, TaskError::Geometry(_)));
    }
}
