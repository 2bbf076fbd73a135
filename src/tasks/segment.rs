use std::sync::Arc;

use log::warn;
use rand::prelude::*;

use crate::prelude::*;

const RANDOM_POOL_SIZE: usize = 32768;

const DIRECTIONS: [(isize, isize, isize); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// Segments a slice stack by counting random walk visits
///
/// The label field marks the region of interest in the first slice; every
/// labelled voxel launches a bundle of random walks through the volume.
/// Voxels that belong to the same structure get visited often, so the
/// per-voxel visit tally doubles as a soft segmentation. The walks draw
/// their directions from a fixed pool of uniform samples seeded from the
/// configuration, which makes runs reproducible.
pub struct SegmentTask {
    _seed: u64,
    _n_walks_per_label: usize,
    _n_steps: usize,

    _dispatcher: Option<Arc<Dispatcher>>,
    _pool: Vec<f32>,

    _tally: Option<Vec<u16>>,
    _shape: Option<Requisition>,
    _current: usize,
}

fn walk(
    item: usize,
    start: (usize, usize),
    pool: &[f32],
    n_steps: usize,
    shape: (usize, usize, usize),
    tally: &mut [u16],
) {
    let (width, height, depth) = shape;
    let (mut x, mut y, mut z) = (start.0 as isize, start.1 as isize, 0isize);

    let visit = |tally: &mut [u16], x: isize, y: isize, z: isize| {
        let index = x as usize + y as usize * width + z as usize * width * height;
        tally[index] = tally[index].saturating_add(1);
    };

    visit(tally, x, y, z);

    for step in 0..n_steps {
        let sample = pool[(item.wrapping_mul(7919).wrapping_add(step)) % RANDOM_POOL_SIZE];
        let (dx, dy, dz) = DIRECTIONS[(sample * 6.0) as usize];

        let (nx, ny, nz) = (x + dx, y + dy, z + dz);
        if nx >= 0
            && ny >= 0
            && nz >= 0
            && (nx as usize) < width
            && (ny as usize) < height
            && (nz as usize) < depth
        {
            x = nx;
            y = ny;
            z = nz;
        }

        visit(tally, x, y, z);
    }
}

impl SegmentTask {
    pub fn new(seed: u64, n_walks_per_label: usize, n_steps: usize) -> Result<SegmentTask, TaskError> {
        if n_walks_per_label == 0 || n_steps == 0 {
            return Err(TaskError::Config(
                "walk and step counts must be positive".to_string(),
            ));
        }

        return Ok(SegmentTask {
            _seed: seed,
            _n_walks_per_label: n_walks_per_label,
            _n_steps: n_steps,
            _dispatcher: None,
            _pool: Vec::new(),
            _tally: None,
            _shape: None,
            _current: 0,
        });
    }

    fn extract_seeds(label: &Buffer) -> Vec<(usize, usize)> {
        let width = label.requisition().width();
        let height = label.requisition().height();

        let mut seeds = Vec::new();
        for x in 0..width {
            for y in 0..height {
                if label.host()[x + y * width] > 0.0 {
                    seeds.push((x, y));
                }
            }
        }

        return seeds;
    }
}

impl Task for SegmentTask {
    fn setup(&mut self, resources: &Resources) -> Result<(), TaskError> {
        self._dispatcher = Some(resources.dispatcher());

        let mut rng = StdRng::seed_from_u64(self._seed);
        self._pool = (0..RANDOM_POOL_SIZE).map(|_| rng.gen::<f32>()).collect();

        return Ok(());
    }

    fn mode(&self) -> TaskMode {
        return TaskMode::Reductor;
    }

    fn num_inputs(&self) -> usize {
        return 2;
    }

    fn num_dimensions(&self, input: usize) -> Option<usize> {
        return match input {
            0 => Some(3),
            _ => Some(2),
        };
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let stack = inputs[0].requisition();
        return Ok(Requisition::new_2d(stack.width(), stack.height()));
    }

    fn process(&mut self, inputs: &[&Buffer], _output: &mut Buffer) -> Result<bool, TaskError> {
        let dispatcher = self
            ._dispatcher
            .as_ref()
            .ok_or_else(|| TaskError::Resource("task has not been set up".to_string()))?
            .clone();

        let stack = inputs[0];
        let label = inputs[1];

        let width = stack.requisition().width();
        let height = stack.requisition().height();
        let depth = stack.requisition().depth();

        if label.requisition().width() != width || label.requisition().height() != height {
            warn!(
                "label field {:?} does not match slices {:?}, skipping stack",
                label.requisition().dims(),
                stack.requisition().dims()
            );
            return Ok(true);
        }

        let seeds = SegmentTask::extract_seeds(label);
        let n_walks = self._n_walks_per_label;
        let n_steps = self._n_steps;
        let pool = &self._pool;

        let tally = dispatcher.fold_tallies(
            width * height * depth,
            seeds.len() * n_walks,
            |item, tally| {
                let start = seeds[item / n_walks];
                walk(item, start, pool, n_steps, (width, height, depth), tally);
            },
        );

        self._tally = Some(tally);
        self._shape = Some(stack.requisition().clone());
        self._current = depth;

        return Ok(true);
    }

    fn generate(&mut self, output: &mut Buffer) -> Result<bool, TaskError> {
        let (tally, shape) = match (&self._tally, &self._shape) {
            (Some(tally), Some(shape)) => (tally, shape),
            _ => return Ok(false),
        };

        if self._current == 0 {
            self._tally = None;
            self._shape = None;
            return Ok(false);
        }

        let slice_len = shape.width() * shape.height();
        let offset = (shape.depth() - self._current) * slice_len;

        for (texel, count) in output
            .host_mut()
            .iter_mut()
            .zip(tally[offset..offset + slice_len].iter())
        {
            *texel = *count as f32;
        }

        self._current -= 1;
        return Ok(true);
    }
}
