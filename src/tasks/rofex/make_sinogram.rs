use crate::prelude::*;

/// Assembles full-ring sinogram stacks from per-module detector dumps
///
/// Each input carries one module's projections for every plane and slice,
/// laid out detector-fastest. After all modules of a cycle arrived the task
/// emits a single 3-D stack `[n_dets, n_proj, n_slices * n_planes]` where
/// the detectors of all modules sit side by side per projection row.
pub struct MakeSinogramTask {
    _n_modules: usize,
    _n_det_per_module: usize,
    _n_projections: usize,
    _n_planes: usize,

    _accumulator: Option<Vec<f32>>,
    _n_slices: Option<usize>,
    _module: usize,
    _ready: bool,
}

impl MakeSinogramTask {
    pub fn new(
        n_modules: usize,
        n_det_per_module: usize,
        n_projections: usize,
        n_planes: usize,
    ) -> Result<MakeSinogramTask, TaskError> {
        if n_modules == 0 || n_det_per_module == 0 || n_projections == 0 || n_planes == 0 {
            return Err(TaskError::Config(
                "module, detector, projection and plane counts must be positive".to_string(),
            ));
        }

        return Ok(MakeSinogramTask {
            _n_modules: n_modules,
            _n_det_per_module: n_det_per_module,
            _n_projections: n_projections,
            _n_planes: n_planes,
            _accumulator: None,
            _n_slices: None,
            _module: 0,
            _ready: false,
        });
    }

    /// Slices per plane implied by the input length
    fn infer_slices(&mut self, input_len: usize) -> Result<usize, TaskError> {
        let per_slice = self._n_det_per_module * self._n_projections * self._n_planes;

        if input_len == 0 || input_len % per_slice != 0 {
            return Err(TaskError::Geometry(format!(
                "module dump of {} values is not a multiple of {} (dets x proj x planes)",
                input_len, per_slice
            )));
        }

        let n_slices = input_len / per_slice;

        match self._n_slices {
            Some(expected) if expected != n_slices => {
                return Err(TaskError::Geometry(format!(
                    "slice count changed from {} to {}",
                    expected, n_slices
                )));
            }
            None => self._n_slices = Some(n_slices),
            _ => {}
        }

        return Ok(n_slices);
    }
}

impl Task for MakeSinogramTask {
    fn mode(&self) -> TaskMode {
        return TaskMode::Reductor;
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let n_slices = self.infer_slices(inputs[0].len())?;

        return Ok(Requisition::new_3d(
            self._n_det_per_module * self._n_modules,
            self._n_projections,
            n_slices * self._n_planes,
        ));
    }

    fn process(&mut self, inputs: &[&Buffer], _output: &mut Buffer) -> Result<bool, TaskError> {
        let n_slices = self.infer_slices(inputs[0].len())?;

        let n_det_pm = self._n_det_per_module;
        let n_dets = n_det_pm * self._n_modules;
        let n_proj = self._n_projections;
        let n_planes = self._n_planes;

        let accumulator = self
            ._accumulator
            .get_or_insert_with(|| vec![0.0; n_dets * n_proj * n_slices * n_planes]);

        let module = self._module;
        let dump = inputs[0].host();

        for slice in 0..n_slices {
            for plane in 0..n_planes {
                let sino = plane + slice * n_planes;
                for proj in 0..n_proj {
                    let src = proj * n_det_pm + sino * n_det_pm * n_proj;
                    let dst = module * n_det_pm + proj * n_dets + sino * n_dets * n_proj;
                    accumulator[dst..dst + n_det_pm].copy_from_slice(&dump[src..src + n_det_pm]);
                }
            }
        }

        self._module += 1;
        if self._module == self._n_modules {
            self._ready = true;
            return Ok(false);
        }

        return Ok(true);
    }

    fn generate(&mut self, output: &mut Buffer) -> Result<bool, TaskError> {
        if !self._ready {
            return Ok(false);
        }

        match &self._accumulator {
            Some(accumulator) => output.host_mut().copy_from_slice(accumulator),
            None => return Ok(false),
        }

        self._ready = false;
        self._module = 0;

        return Ok(true);
    }
}
