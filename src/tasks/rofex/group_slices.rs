use crate::prelude::*;

/// Regroups a stream of plane-tagged frames into one stack per plane
///
/// Inverse of the slicing stage: frames belonging to the same measurement
/// plane are stacked along axis 2 in arrival order. Once every plane holds
/// `n_frames` frames the stacks are emitted in plane order and a new cycle
/// begins.
pub struct GroupSlicesTask {
    _n_frames: usize,
    _n_planes: usize,

    _stacks: Vec<Vec<f32>>,
    _cursors: Vec<usize>,
    _frame_shape: Option<Requisition>,
    _received: usize,

    _emitting: bool,
    _emit_cursor: usize,
}

impl GroupSlicesTask {
    pub fn new(n_frames: usize, n_planes: usize) -> Result<GroupSlicesTask, TaskError> {
        if n_frames == 0 || n_planes == 0 {
            return Err(TaskError::Config(
                "frame and plane counts must be positive".to_string(),
            ));
        }

        return Ok(GroupSlicesTask {
            _n_frames: n_frames,
            _n_planes: n_planes,
            _stacks: Vec::new(),
            _cursors: vec![0; n_planes],
            _frame_shape: None,
            _received: 0,
            _emitting: false,
            _emit_cursor: 0,
        });
    }

    fn check_frame(&mut self, input: &Buffer) -> Result<(), TaskError> {
        match &self._frame_shape {
            Some(shape) => {
                if shape != input.requisition() {
                    return Err(TaskError::Geometry(format!(
                        "frame shape changed from {:?} to {:?}",
                        shape.dims(),
                        input.requisition().dims()
                    )));
                }
            }
            None => {
                let stack_len = input.len() * self._n_frames;
                self._stacks = vec![vec![0.0; stack_len]; self._n_planes];
                self._frame_shape = Some(input.requisition().clone());
            }
        }

        return Ok(());
    }
}

impl Task for GroupSlicesTask {
    fn mode(&self) -> TaskMode {
        return TaskMode::Reductor;
    }

    fn num_dimensions(&self, _input: usize) -> Option<usize> {
        return Some(2);
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let frame = inputs[0].requisition();
        return Ok(Requisition::new_3d(
            frame.width(),
            frame.height(),
            self._n_frames,
        ));
    }

    fn process(&mut self, inputs: &[&Buffer], _output: &mut Buffer) -> Result<bool, TaskError> {
        let frame = inputs[0];

        let plane = frame.plane_index().ok_or_else(|| {
            TaskError::Geometry("grouping requires plane-tagged frames".to_string())
        })? as usize;

        if plane >= self._n_planes {
            return Err(TaskError::Geometry(format!(
                "plane index {} out of range for {} planes",
                plane, self._n_planes
            )));
        }

        self.check_frame(frame)?;

        let cursor = self._cursors[plane];
        if cursor == self._n_frames {
            return Err(TaskError::Geometry(format!(
                "plane {} already received {} frames this cycle",
                plane, self._n_frames
            )));
        }

        let offset = cursor * frame.len();
        self._stacks[plane][offset..offset + frame.len()].copy_from_slice(frame.host());
        self._cursors[plane] += 1;
        self._received += 1;

        if self._received == self._n_planes * self._n_frames {
            self._emitting = true;
            self._emit_cursor = 0;
            return Ok(false);
        }

        return Ok(true);
    }

    fn generate(&mut self, output: &mut Buffer) -> Result<bool, TaskError> {
        if !self._emitting {
            return Ok(false);
        }

        if self._emit_cursor == self._n_planes {
            self._emitting = false;
            self._received = 0;
            self._cursors.fill(0);
            return Ok(false);
        }

        output
            .host_mut()
            .copy_from_slice(&self._stacks[self._emit_cursor]);
        output.set_plane_index(Some(self._emit_cursor as u32));
        self._emit_cursor += 1;

        return Ok(true);
    }
}
