use crate::prelude::*;
use crate::tasks::rofex::frame_plane;

/// Splits a 3-D stack into a stream of single 2-D slices
///
/// Slices leave in storage order; with more than one slice per stack each
/// one is tagged with the plane it belongs to (planes cycle fastest along
/// axis 2).
pub struct SliceTask {
    _n_planes: usize,

    _retained: Option<Buffer>,
    _current: usize,
}

impl SliceTask {
    pub fn new(n_planes: usize) -> Result<SliceTask, TaskError> {
        if n_planes == 0 {
            return Err(TaskError::Config("plane count must be positive".to_string()));
        }

        return Ok(SliceTask {
            _n_planes: n_planes,
            _retained: None,
            _current: 0,
        });
    }
}

impl Task for SliceTask {
    fn mode(&self) -> TaskMode {
        return TaskMode::Reductor;
    }

    fn num_dimensions(&self, _input: usize) -> Option<usize> {
        return Some(3);
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let stack = inputs[0].requisition();
        return Ok(Requisition::new_2d(stack.width(), stack.height()));
    }

    fn process(&mut self, inputs: &[&Buffer], _output: &mut Buffer) -> Result<bool, TaskError> {
        self._retained = Some(inputs[0].dup());
        self._current = 0;
        return Ok(false);
    }

    fn generate(&mut self, output: &mut Buffer) -> Result<bool, TaskError> {
        let retained = match &self._retained {
            Some(retained) => retained,
            None => return Ok(false),
        };

        let depth = retained.requisition().depth();
        if self._current == depth {
            self._retained = None;
            self._current = 0;
            return Ok(false);
        }

        let slice_len = retained.requisition().width() * retained.requisition().height();
        let offset = self._current * slice_len;
        output
            .host_mut()
            .copy_from_slice(&retained.host()[offset..offset + slice_len]);

        if depth > 1 {
            let (_, plane) = frame_plane(self._current, self._n_planes);
            output.set_plane_index(Some(plane as u32));
        } else {
            output.copy_metadata_from(retained);
        }

        self._current += 1;
        return Ok(true);
    }
}
