use std::sync::Arc;

use crate::prelude::*;

/// Resamples fan beam sinograms onto a parallel beam grid
///
/// The second input is a precomputed gather table: two floats per output
/// texel giving the fractional (detector, projection) coordinate to read
/// from the fan sinogram. A flat (2-D) table applies to every plane; a 3-D
/// table carries one map per measurement plane, selected by the sinogram's
/// `plane_index` tag.
pub struct Fan2ParaTask {
    _n_planes: usize,
    _n_par_dets: usize,
    _n_par_proj: usize,
    _dispatcher: Option<Arc<Dispatcher>>,
}

struct GatherKernel<'a> {
    fan: &'a [f32],
    table: &'a [f32],
    n_fan_dets: usize,
    n_fan_proj: usize,
}

impl GatherKernel<'_> {
    fn sample(&self, det: usize, proj: usize) -> f32 {
        return self.fan[proj * self.n_fan_dets + det];
    }
}

impl Kernel for GatherKernel<'_> {
    fn kernel_exec(&self, input: KernelInput) -> f32 {
        let texel = input.thread_y * input.buffer_width + input.thread_x;
        let det = self.table[2 * texel];
        let proj = self.table[2 * texel + 1];

        // unmapped texels stay empty
        if det < 0.0
            || proj < 0.0
            || det > (self.n_fan_dets - 1) as f32
            || proj > (self.n_fan_proj - 1) as f32
        {
            return 0.0;
        }

        let d0 = det.floor() as usize;
        let p0 = proj.floor() as usize;
        let d1 = (d0 + 1).min(self.n_fan_dets - 1);
        let p1 = (p0 + 1).min(self.n_fan_proj - 1);

        let fd = det - d0 as f32;
        let fp = proj - p0 as f32;

        let low = self.sample(d0, p0) * (1.0 - fd) + self.sample(d1, p0) * fd;
        let high = self.sample(d0, p1) * (1.0 - fd) + self.sample(d1, p1) * fd;

        return low * (1.0 - fp) + high * fp;
    }
}

impl Fan2ParaTask {
    pub fn new(
        n_planes: usize,
        n_par_dets: usize,
        n_par_proj: usize,
    ) -> Result<Fan2ParaTask, TaskError> {
        if n_planes == 0 || n_par_dets == 0 || n_par_proj == 0 {
            return Err(TaskError::Config(
                "plane, detector and projection counts must be positive".to_string(),
            ));
        }

        return Ok(Fan2ParaTask {
            _n_planes: n_planes,
            _n_par_dets: n_par_dets,
            _n_par_proj: n_par_proj,
            _dispatcher: None,
        });
    }

    /// Entries the gather table carries per plane
    fn entries_per_plane(&self) -> usize {
        return 2 * self._n_par_dets * self._n_par_proj;
    }

    fn plane_table<'a>(
        &self,
        sinogram: &Buffer,
        table: &'a Buffer,
    ) -> Result<&'a [f32], TaskError> {
        let entries = self.entries_per_plane();

        if table.requisition().n_dims() == 3 {
            if table.len() != entries * self._n_planes {
                return Err(TaskError::Geometry(format!(
                    "per-plane gather table holds {} values, expected {}",
                    table.len(),
                    entries * self._n_planes
                )));
            }

            let plane = sinogram.plane_index().ok_or_else(|| {
                TaskError::Geometry(
                    "per-plane gather table requires plane-tagged sinograms".to_string(),
                )
            })? as usize;

            if plane >= self._n_planes {
                return Err(TaskError::Geometry(format!(
                    "plane index {} out of range for {} planes",
                    plane, self._n_planes
                )));
            }

            return Ok(&table.host()[plane * entries..(plane + 1) * entries]);
        }

        if table.len() != entries {
            return Err(TaskError::Geometry(format!(
                "gather table holds {} values, expected {}",
                table.len(),
                entries
            )));
        }

        return Ok(table.host());
    }
}

impl Task for Fan2ParaTask {
    fn setup(&mut self, resources: &Resources) -> Result<(), TaskError> {
        self._dispatcher = Some(resources.dispatcher());
        return Ok(());
    }

    fn mode(&self) -> TaskMode {
        return TaskMode::Processor;
    }

    fn num_inputs(&self) -> usize {
        return 2;
    }

    fn num_dimensions(&self, input: usize) -> Option<usize> {
        return match input {
            0 => Some(2),
            _ => None,
        };
    }

    fn get_requisition(&mut self, _inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        return Ok(Requisition::new_2d(self._n_par_dets, self._n_par_proj));
    }

    fn process(&mut self, inputs: &[&Buffer], output: &mut Buffer) -> Result<bool, TaskError> {
        let dispatcher = self
            ._dispatcher
            .as_ref()
            .ok_or_else(|| TaskError::Resource("task has not been set up".to_string()))?
            .clone();

        let sinogram = inputs[0];
        let table = self.plane_table(sinogram, inputs[1])?;

        let kernel = GatherKernel {
            fan: sinogram.host(),
            table,
            n_fan_dets: sinogram.requisition().width(),
            n_fan_proj: sinogram.requisition().height(),
        };

        dispatcher.do_tiles(&kernel, output);
        output.copy_metadata_from(sinogram);

        return Ok(true);
    }
}
