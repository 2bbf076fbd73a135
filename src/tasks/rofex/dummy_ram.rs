use crate::prelude::*;

/// Emulates the per-module detector RAM of the beamline hardware
///
/// Raw projection chunks arrive module-major, then plane-major, then
/// frame-major. Each chunk lands in its module's RAM image; once a full
/// cycle is buffered the task emits one buffer per module.
///
/// With `collect_frames` the RAM holds `n_frames` frames per plane and the
/// task latches after the first cycle, absorbing any further input without
/// effect. Without it the RAM holds a single frame and the cycle repeats.
pub struct DummyRamTask {
    _n_modules: usize,
    _n_planes: usize,
    _n_frames: usize,
    _collect_frames: bool,

    _rams: Vec<Vec<f32>>,
    _chunk_shape: Option<Requisition>,

    _module: usize,
    _plane: usize,
    _frame: usize,

    _emitting: bool,
    _emit_cursor: usize,
    _stopped: bool,
}

impl DummyRamTask {
    pub fn new(
        n_modules: usize,
        n_planes: usize,
        n_frames: usize,
        collect_frames: bool,
    ) -> Result<DummyRamTask, TaskError> {
        if n_modules == 0 || n_planes == 0 || n_frames == 0 {
            return Err(TaskError::Config(
                "module, plane and frame counts must be positive".to_string(),
            ));
        }

        return Ok(DummyRamTask {
            _n_modules: n_modules,
            _n_planes: n_planes,
            _n_frames: n_frames,
            _collect_frames: collect_frames,
            _rams: Vec::new(),
            _chunk_shape: None,
            _module: 0,
            _plane: 0,
            _frame: 0,
            _emitting: false,
            _emit_cursor: 0,
            _stopped: false,
        });
    }

    /// Frames buffered per plane in each module RAM
    fn frames_per_cycle(&self) -> usize {
        return if self._collect_frames { self._n_frames } else { 1 };
    }

    fn check_chunk(&mut self, input: &Buffer) -> Result<(), TaskError> {
        match &self._chunk_shape {
            Some(shape) => {
                if shape != input.requisition() {
                    return Err(TaskError::Geometry(format!(
                        "chunk shape changed from {:?} to {:?}",
                        shape.dims(),
                        input.requisition().dims()
                    )));
                }
            }
            None => {
                let chunk_len = input.len();
                let ram_len = chunk_len * self._n_planes * self.frames_per_cycle();
                self._rams = vec![vec![0.0; ram_len]; self._n_modules];
                self._chunk_shape = Some(input.requisition().clone());
            }
        }

        return Ok(());
    }
}

impl Task for DummyRamTask {
    fn mode(&self) -> TaskMode {
        return TaskMode::Reductor;
    }

    fn num_dimensions(&self, _input: usize) -> Option<usize> {
        return Some(2);
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let chunk = inputs[0].requisition();
        return Ok(Requisition::new_2d(
            chunk.width(),
            chunk.height() * self._n_planes * self.frames_per_cycle(),
        ));
    }

    fn process(&mut self, inputs: &[&Buffer], _output: &mut Buffer) -> Result<bool, TaskError> {
        if self._stopped {
            return Ok(true);
        }

        self.check_chunk(inputs[0])?;

        let chunk = inputs[0].host();
        let chunk_index = if self._collect_frames {
            self._frame * self._n_planes + self._plane
        } else {
            self._plane
        };

        let offset = chunk_index * chunk.len();
        self._rams[self._module][offset..offset + chunk.len()].copy_from_slice(chunk);

        self._module += 1;
        if self._module == self._n_modules {
            self._module = 0;
            self._plane += 1;

            if self._plane == self._n_planes {
                self._plane = 0;
                self._frame += 1;
            }
        }

        let cycle_full = if self._collect_frames {
            self._frame == self._n_frames
        } else {
            self._module == 0 && self._plane == 0
        };

        if cycle_full && !self._emitting {
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

        if self._emit_cursor == self._n_modules {
            self._emitting = false;
            self._frame = 0;

            if self._collect_frames {
                self._stopped = true;
                self._rams.clear();
                self._chunk_shape = None;
            }

            return Ok(false);
        }

        output
            .host_mut()
            .copy_from_slice(&self._rams[self._emit_cursor]);
        self._emit_cursor += 1;

        return Ok(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(module: usize, plane: usize, frame: usize) -> Buffer {
        // 2 detectors x 3 projections, payload encodes provenance
        let base = (frame * 100 + plane * 10 + module) as f32;
        let data = (0..6).map(|i| base + i as f32 / 10.0).collect();
        return Buffer::from_vec(Requisition::new_2d(2, 3), data);
    }

    #[test]
    fn one_buffer_per_module_per_frame() {
        let resources = Resources::new(0);
        let mut task = DummyRamTask::new(3, 2, 1, false).unwrap();

        let mut sets = Vec::new();
        for frame in 0..2 {
            for plane in 0..2 {
                for module in 0..3 {
                    sets.push(vec![chunk(module, plane, frame)]);
                }
            }
        }

        let outputs = drive(&mut task, &resources, &sets).unwrap();
        assert_eq!(outputs.len(), 6); // 3 modules x 2 cycles

        // module 1, frame 0: plane 0 chunk then plane 1 chunk
        let ram = &outputs[1];
        assert_eq!(ram.requisition().dims(), &[2, 12]);
        assert_eq!(ram.host()[0], 1.0);
        assert_eq!(ram.host()[6], 11.0);

        // second cycle holds frame 1 data
        assert_eq!(outputs[3].host()[0], 100.0);
    }

    #[test]
    fn collect_frames_latches_after_one_cycle() {
        let resources = Resources::new(0);
        let mut task = DummyRamTask::new(2, 1, 2, true).unwrap();

        let mut sets = Vec::new();
        for frame in 0..3 {
            for module in 0..2 {
                sets.push(vec![chunk(module, 0, frame)]);
            }
        }

        let outputs = drive(&mut task, &resources, &sets).unwrap();
        assert_eq!(outputs.len(), 2);

        // each module RAM stacks its two frames
        assert_eq!(outputs[0].requisition().dims(), &[2, 6]);
        assert_eq!(outputs[0].host()[0], 0.0);
        assert_eq!(outputs[0].host()[6], 100.0);
        assert_eq!(outputs[1].host()[0], 1.0);
    }

    #[test]
    fn chunk_shape_change_is_a_geometry_error() {
        let resources = Resources::new(0);
        let mut task = DummyRamTask::new(2, 1, 1, false).unwrap();
        task.setup(&resources).unwrap();

        let first = chunk(0, 0, 0);
        let mut out = Buffer::new(Requisition::new_2d(2, 3));
        task.process(&[&first], &mut out).unwrap();

        let odd = Buffer::new(Requisition::new_2d(3, 2));
        let err = task.process(&[&odd], &mut out).unwrap_err();
        assert!(matches!(err, TaskError::Geometry(_)));
    }
}
