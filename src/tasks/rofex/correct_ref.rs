use log::warn;

use crate::prelude::*;

// Asymmetric smoothing window applied to the per-detector flicker scores;
// only the first nine taps are used, once per angular direction.
const FILTER_FUNCTION: [f32; 17] = [
    0.5, 1.0, 1.0, 1.0, 1.5, 2.0, 3.0, 3.5, 2.0, 3.5, 3.0, 2.0, 1.5, 1.0, 1.0, 1.0, 0.5,
];

/// What the task emits after correcting the reference frames
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlatOutput {
    /// The corrected stack, same shape as the input
    Corrected,
    /// Per-plane mean of the corrected frames, `[n_fan_dets, n_fan_proj * n_planes]`
    PlaneAverage,
}

/// Repairs defective detectors in reference (flat field) measurements
///
/// A detector is suspicious when its flicker score, the summed projection-
/// to-projection variation weighted by the value range, falls outside a
/// band around the smoothed score of its half ring: too static means the
/// channel is stuck, too noisy means it flickers, and noisy channels drag
/// their two angular neighbors with them. Flagged runs are rebuilt by
/// linear interpolation between the nearest healthy detectors on the ring.
pub struct CorrectRefTask {
    _n_planes: usize,
    _threshold_min: f32,
    _threshold_max: f32,
    _output: FlatOutput,

    _filter: [f32; 17],
}

/// Flicker score per detector: summed projection-to-projection variation
/// scaled by the squared value range
fn detector_scores(frame: &[f32], n_dets: usize, n_proj: usize) -> Vec<f32> {
    let mut scores = vec![0.0; n_dets];

    for (det, score) in scores.iter_mut().enumerate() {
        let mut max_val = frame[det];
        let mut min_val = max_val;
        let mut variation = 0.0;

        for proj in 0..n_proj - 1 {
            let cur = frame[det + proj * n_dets];
            let next = frame[det + (proj + 1) * n_dets];

            variation += (cur - next).abs();
            max_val = max_val.max(cur);
            min_val = min_val.min(cur);
        }

        *score = variation * (max_val - min_val) * (max_val - min_val);
    }

    return scores;
}

fn find_defects(
    scores: &[f32],
    filter: &[f32; 17],
    threshold_min: f32,
    threshold_max: f32,
    n_dets: usize,
) -> Vec<bool> {
    let mut defects = vec![false; n_dets];
    let half = (n_dets / 2) as isize;

    for segment in 0..2 {
        let base = segment * half as usize;

        for i in 0..half {
            // smooth within the half ring, circularly, in both directions
            let mut local = 0.0;
            for (j, tap) in filter.iter().take(9).enumerate() {
                let behind = (i - j as isize).rem_euclid(half) as usize;
                let ahead = (i + j as isize).rem_euclid(half) as usize;
                local += tap * (scores[base + behind] + scores[base + ahead]);
            }

            let det = base + i as usize;

            if scores[det] < threshold_min * local {
                defects[det] = true;
            }

            if scores[det] > threshold_max * local {
                // a flickering channel taints its angular neighbors
                for offset in -2..=2 {
                    let tainted = (det as isize + offset).rem_euclid(n_dets as isize);
                    defects[tainted as usize] = true;
                }
            }
        }
    }

    return defects;
}

/// Rebuilds every flagged circular run from its nearest healthy neighbors,
/// linearly weighted by the position inside the run
fn interpolate_defects(frame: &mut [f32], defects: &[bool], n_dets: usize, n_proj: usize) {
    let flagged = defects.iter().filter(|flag| **flag).count();

    if flagged == 0 {
        return;
    }

    if flagged == n_dets {
        warn!("every detector was flagged as defective, leaving the frame untouched");
        return;
    }

    // start from a healthy detector so runs wrapping the ring seam stay whole
    let mut start = 0;
    while defects[start] {
        start += 1;
    }

    let mut scanned = 0;
    while scanned < n_dets {
        let run_start = (start + scanned) % n_dets;

        if !defects[run_start] {
            scanned += 1;
            continue;
        }

        let mut run_len = 1;
        while defects[(run_start + run_len) % n_dets] {
            run_len += 1;
        }

        let left = (run_start + n_dets - 1) % n_dets;
        let right = (run_start + run_len) % n_dets;

        for k in 0..run_len {
            let w1 = (k + 1) as f32 / (run_len + 1) as f32;
            let w0 = 1.0 - w1;
            let det = (run_start + k) % n_dets;

            for proj in 0..n_proj {
                let row = proj * n_dets;
                frame[det + row] = w0 * frame[left + row] + w1 * frame[right + row];
            }
        }

        scanned += run_len;
    }
}

impl CorrectRefTask {
    pub fn new(
        n_planes: usize,
        threshold_min: f32,
        threshold_max: f32,
        output: FlatOutput,
    ) -> Result<CorrectRefTask, TaskError> {
        if n_planes == 0 {
            return Err(TaskError::Config("plane count must be positive".to_string()));
        }

        if threshold_min <= 0.0 || threshold_max <= 0.0 {
            return Err(TaskError::Config(format!(
                "thresholds must be positive, got {} and {}",
                threshold_min, threshold_max
            )));
        }

        let sum: f32 = FILTER_FUNCTION.iter().sum();
        let mut filter = FILTER_FUNCTION;
        for tap in filter.iter_mut() {
            *tap /= sum;
        }

        return Ok(CorrectRefTask {
            _n_planes: n_planes,
            _threshold_min: threshold_min,
            _threshold_max: threshold_max,
            _output: output,
            _filter: filter,
        });
    }

    fn check_geometry(&self, input: &Requisition) -> Result<(), TaskError> {
        if input.width() % 2 != 0 {
            return Err(TaskError::Geometry(format!(
                "detector count {} cannot split into two half rings",
                input.width()
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

impl Task for CorrectRefTask {
    fn mode(&self) -> TaskMode {
        return TaskMode::Processor;
    }

    fn num_dimensions(&self, _input: usize) -> Option<usize> {
        return Some(3);
    }

    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError> {
        let input = inputs[0].requisition();
        self.check_geometry(input)?;

        return Ok(match self._output {
            FlatOutput::Corrected => input.clone(),
            FlatOutput::PlaneAverage => Requisition::new_2d(
                input.width(),
                input.height() * self._n_planes,
            ),
        });
    }

    fn process(&mut self, inputs: &[&Buffer], output: &mut Buffer) -> Result<bool, TaskError> {
        self.check_geometry(inputs[0].requisition())?;

        let n_dets = inputs[0].requisition().width();
        let n_proj = inputs[0].requisition().height();
        let n_frames = inputs[0].requisition().depth() / self._n_planes;
        let frame_len = n_dets * n_proj;

        let mut corrected = inputs[0].host().to_vec();

        for frame in corrected.chunks_mut(frame_len) {
            let scores = detector_scores(frame, n_dets, n_proj);
            let defects = find_defects(
                &scores,
                &self._filter,
                self._threshold_min,
                self._threshold_max,
                n_dets,
            );
            interpolate_defects(frame, &defects, n_dets, n_proj);
        }

        match self._output {
            FlatOutput::Corrected => output.host_mut().copy_from_slice(&corrected),
            FlatOutput::PlaneAverage => {
                let avg = output.host_mut();
                avg.fill(0.0);

                let factor = 1.0 / n_frames as f32;
                for frame in 0..n_frames {
                    for plane in 0..self._n_planes {
                        let src = (frame * self._n_planes + plane) * frame_len;
                        let dst = plane * frame_len;
                        for i in 0..frame_len {
                            avg[dst + i] += corrected[src + i] * factor;
                        }
                    }
                }
            }
        }

        output.copy_metadata_from(inputs[0]);
        return Ok(true);
    }
}
