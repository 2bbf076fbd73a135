use std::sync::Arc;

use log::debug;

use crate::prelude::*;

/// The fold applied over every element of an input buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceMode {
    Sum,
    Mean,
    Min,
    Max,
}

impl ReduceMode {
    /// Label attached to the output's scalar tag
    pub fn label(&self) -> &'static str {
        return match self {
            ReduceMode::Sum => "sum",
            ReduceMode::Mean => "mean",
            ReduceMode::Min => "min",
            ReduceMode::Max => "max",
        };
    }

    fn identity(&self) -> f32 {
        return match self {
            ReduceMode::Sum | ReduceMode::Mean => 0.0,
            ReduceMode::Min => f32::INFINITY,
            ReduceMode::Max => f32::NEG_INFINITY,
        };
    }

    fn combine(&self, a: f32, b: f32) -> f32 {
        return match self {
            ReduceMode::Sum | ReduceMode::Mean => a + b,
            ReduceMode::Min => a.min(b),
            ReduceMode::Max => a.max(b),
        };
    }
}

/// Splits `remaining` elements into load-balanced work groups
///
/// Instead of one group per `local` elements, each lane folds roughly
/// sqrt(groups) elements serially so the group count (and with it the
/// number of passes) shrinks quadratically.
///
/// Returns (group count, elements folded per lane).
fn balance(remaining: usize, local: usize) -> (usize, usize) {
    let flat_groups = (remaining - 1) / local + 1;
    let per_lane = (flat_groups as f64).sqrt().ceil() as usize;
    return ((flat_groups - 1) / per_lane + 1, per_lane);
}

fn fold_group(mode: ReduceMode, source: &[f32], group: usize, local: usize, global: usize) -> f32 {
    let mut acc = mode.identity();

    for lane in 0..local {
        let mut index = group * local + lane;
        while index < source.len() {
            acc = mode.combine(acc, source[index]);
            index += global;
        }
    }

    return acc;
}

/// Reduces every element of each input buffer to a single value
///
/// The payload is passed through untouched; the result rides along as a
/// [ScalarTag] so downstream stages can keep streaming image data.
pub struct ReduceTask {
    _mode: ReduceMode,
    _dispatcher: Option<Arc<Dispatcher>>,

    // partial results of one reduction pass, reused across inputs
    _scratch: Option<Vec<f32>>,
    _expected_len: Option<usize>,
}

impl ReduceTask {
    pub fn new(mode: ReduceMode) -> ReduceTask {
        return ReduceTask {
            _mode: mode,
            _dispatcher: None,
            _scratch: None,
            _expected_len: None,
        };
    }

    fn tree_reduce(&mut self, input: &[f32]) -> Result<f32, TaskError> {
        let dispatcher = self
            ._dispatcher
            .as_ref()
            .ok_or_else(|| TaskError::Resource("task has not been set up".to_string()))?
            .clone();

        let total = input.len();

        match self._expected_len {
            Some(expected) if expected != total => {
                return Err(TaskError::Geometry(format!(
                    "input length changed from {} to {} elements",
                    expected, total
                )));
            }
            None => self._expected_len = Some(total),
            _ => {}
        }

        let local = dispatcher.work_group_size();
        let mode = self._mode;

        let mut value = input[0];

        if total > 1 {
            let (first_groups, _) = balance(total, local);
            let scratch = self
                ._scratch
                .get_or_insert_with(|| vec![0.0; first_groups]);

            let mut remaining = total;
            let mut first_pass = true;

            while remaining > 1 {
                let (num_groups, per_lane) = balance(remaining, local);
                let global = num_groups * local;

                debug!(
                    "reduce pass: real size {}, global size {}, groups {}, per lane {}",
                    remaining, global, num_groups, per_lane
                );

                let partials = if first_pass {
                    dispatcher
                        .map_groups(num_groups, |group| {
                            fold_group(mode, input, group, local, global)
                        })
                } else {
                    let source = &scratch[..remaining];
                    dispatcher
                        .map_groups(num_groups, |group| {
                            fold_group(mode, source, group, local, global)
                        })
                };

                scratch[..num_groups].copy_from_slice(&partials);
                remaining = num_groups;
                first_pass = false;
            }

            value = scratch[0];
        }

        if mode == ReduceMode::Mean {
            value /= total as f32;
        }

        return Ok(value);
    }
}

impl Task for ReduceTask {
    fn setup(&mut self, resources: &Resources) -> Result<(), TaskError> {
        self._dispatcher = Some(resources.dispatcher());
        return Ok(());
    }

    fn mode(&self) -> TaskMode {
        return TaskMode::Processor;
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        return Ok(inputs[0].requisition().clone());
    }

    fn process(&mut self, inputs: &[&Buffer], output: &mut Buffer) -> Result<bool, TaskError> {
        let value = self.tree_reduce(inputs[0].host())?;

        output.host_mut().copy_from_slice(inputs[0].host());
        output.copy_metadata_from(inputs[0]);
        output.set_scalar(ScalarTag {
            label: self._mode.label(),
            value,
        });

        return Ok(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    const ALL_MODES: [ReduceMode; 4] = [
        ReduceMode::Sum,
        ReduceMode::Mean,
        ReduceMode::Min,
        ReduceMode::Max,
    ];

    fn reference(mode: ReduceMode, data: &[f32]) -> f32 {
        let folded = data
            .iter()
            .copied()
            .fold(mode.identity(), |a, b| mode.combine(a, b));

        return match mode {
            ReduceMode::Mean => folded / data.len() as f32,
            _ => folded,
        };
    }

    // Small integer payloads keep float sums exact so tree and sequential
    // folds agree bit for bit.
    fn integer_noise(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        return (0..len).map(|_| rng.gen_range(0..16) as f32).collect();
    }

    fn reduce_once(mode: ReduceMode, data: Vec<f32>, resources: &Resources) -> Buffer {
        let len = data.len();
        let input = Buffer::from_vec(Requisition::new_1d(len), data);
        let mut task = ReduceTask::new(mode);

        let mut outputs = drive(&mut task, resources, &[vec![input]]).unwrap();
        assert_eq!(outputs.len(), 1);
        return outputs.remove(0);
    }

    #[test]
    fn matches_sequential_fold_across_sizes() {
        let resources = Resources::new(-1);
        let local = resources.dispatcher().work_group_size();

        let sizes = [1, local - 1, local, local + 1, local * local, 12345];

        for (round, &len) in sizes.iter().enumerate() {
            let data = integer_noise(len, round as u64);

            for mode in ALL_MODES {
                let expected = reference(mode, &data);
                let output = reduce_once(mode, data.clone(), &resources);
                let tag = output.scalar().unwrap();

                assert_eq!(tag.label, mode.label());
                assert_eq!(tag.value, expected, "mode {:?}, len {}", mode, len);
            }
        }
    }

    #[test]
    fn four_by_four_of_ones() {
        let dispatcher = Dispatcher::new(0).with_work_group_size(4);
        let resources = Resources::with_dispatcher(dispatcher);

        let data = vec![1.0; 16];
        let input = Buffer::from_vec(Requisition::new_2d(4, 4), data);

        let mut task = ReduceTask::new(ReduceMode::Sum);
        let outputs = drive(&mut task, &resources, &[vec![input.dup()]]).unwrap();
        assert_eq!(outputs[0].scalar().unwrap().value, 16.0);

        let mut task = ReduceTask::new(ReduceMode::Mean);
        let outputs = drive(&mut task, &resources, &[vec![input]]).unwrap();
        assert_eq!(outputs[0].scalar().unwrap().value, 1.0);
    }

    #[test]
    fn payload_passes_through_untouched() {
        let resources = Resources::new(0);
        let data = integer_noise(300, 7);

        let output = reduce_once(ReduceMode::Max, data.clone(), &resources);
        assert_eq!(output.host(), &data[..]);
    }

    #[test]
    fn length_change_is_a_geometry_error() {
        let resources = Resources::new(0);
        let mut task = ReduceTask::new(ReduceMode::Sum);
        task.setup(&resources).unwrap();

        let first = Buffer::new(Requisition::new_1d(64));
        let second = Buffer::new(Requisition::new_1d(65));

        let mut out = Buffer::new(Requisition::new_1d(64));
        task.process(&[&first], &mut out).unwrap();

        let mut out = Buffer::new(Requisition::new_1d(65));
        let err = task.process(&[&second], &mut out).unwrap_err();
        assert!(matches!(err, TaskError::Geometry(_)));
    }
}
