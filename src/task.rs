use std::sync::Arc;

use thiserror::Error;

use crate::compute::buffer::*;
use crate::compute::dispatcher::*;

/// Errors reported by task setup and execution
#[derive(Debug, Error)]
pub enum TaskError {
    /// A property value that can never work, rejected before any data flows
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure to acquire a pool or allocation
    #[error("resource acquisition failed: {0}")]
    Resource(String),

    /// Input shapes that disagree with the configured geometry
    #[error("geometry mismatch: {0}")]
    Geometry(String),
}

/// Shared facilities handed to every task at setup time
pub struct Resources {
    _dispatcher: Arc<Dispatcher>,
}

impl Resources {
    /// Creates the shared resource set with the provided number of threads
    /// (if < 0, will use system thread count; 0 runs synchronously)
    pub fn new(num_threads: i32) -> Resources {
        return Resources {
            _dispatcher: Arc::new(Dispatcher::new(num_threads)),
        };
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Resources {
        return Resources {
            _dispatcher: Arc::new(dispatcher),
        };
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        return self._dispatcher.clone();
    }
}

/// How a task exchanges buffers with the scheduler
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskMode {
    /// One output per input set, written during [Task::process]
    Processor,
    /// Accumulates input across several calls, emits through [Task::generate]
    Reductor,
}

/// A node in the dataflow graph
///
/// The scheduler repeatedly asks the task for the shape of its next output
/// ([Task::get_requisition]), allocates a buffer of that shape and hands it
/// to [Task::process] together with the next input set. A processor fills
/// the output right away; a reductor accumulates until `process` returns
/// `false`, after which [Task::generate] is polled until it too returns
/// `false` and the task starts a fresh cycle.
pub trait Task {
    /// Validates configuration and binds shared resources
    fn setup(&mut self, _resources: &Resources) -> Result<(), TaskError> {
        return Ok(());
    }

    fn mode(&self) -> TaskMode;

    /// Number of input buffers consumed per [Task::process] call
    fn num_inputs(&self) -> usize {
        return 1;
    }

    /// Required rank of the given input, or `None` if any rank is accepted
    fn num_dimensions(&self, _input: usize) -> Option<usize> {
        return None;
    }

    /// Shape of the next output, derived from the input shapes
    fn get_requisition(&mut self, inputs: &[&Buffer]) -> Result<Requisition, TaskError>;

    /// Consumes one input set
    ///
    /// Returns `true` to request more input, `false` once a reductor is
    /// ready to emit. Processors write their result into `output` and
    /// return `true`.
    fn process(&mut self, inputs: &[&Buffer], output: &mut Buffer) -> Result<bool, TaskError>;

    /// Emits one buffer of accumulated results
    ///
    /// Returns `true` while `output` was filled, `false` once exhausted.
    fn generate(&mut self, _output: &mut Buffer) -> Result<bool, TaskError> {
        return Ok(false);
    }
}

fn drain<T: Task + ?Sized>(
    task: &mut T,
    requisition: &Requisition,
    outputs: &mut Vec<Buffer>,
) -> Result<(), TaskError> {
    loop {
        let mut output = Buffer::new(requisition.clone());
        if !task.generate(&mut output)? {
            return Ok(());
        }
        outputs.push(output);
    }
}

/// Drives a task through the full pull/push cycle over a stream of input
/// sets, collecting every emitted buffer
///
/// Input sets must arrive in the round-robin order the task expects
/// (module-major, then plane-major, then frame-major for the acquisition
/// stages); the scheduler does not reorder.
pub fn drive<T: Task + ?Sized>(
    task: &mut T,
    resources: &Resources,
    input_sets: &[Vec<Buffer>],
) -> Result<Vec<Buffer>, TaskError> {
    task.setup(resources)?;

    let mut outputs = Vec::new();
    let mut last_requisition: Option<Requisition> = None;

    for set in input_sets {
        assert_eq!(set.len(), task.num_inputs());

        let inputs: Vec<&Buffer> = set.iter().collect();
        for (index, input) in inputs.iter().enumerate() {
            if let Some(rank) = task.num_dimensions(index) {
                assert_eq!(input.requisition().n_dims(), rank);
            }
        }
        let requisition = task.get_requisition(&inputs)?;
        let mut output = Buffer::new(requisition.clone());
        let wants_more = task.process(&inputs, &mut output)?;

        match task.mode() {
            TaskMode::Processor => {
                if wants_more {
                    outputs.push(output);
                }
            }
            TaskMode::Reductor => {
                if !wants_more {
                    drain(task, &requisition, &mut outputs)?;
                }
            }
        }

        last_requisition = Some(requisition);
    }

    // End of stream: reductors that never reported readiness still get to
    // emit whatever they accumulated. Exhausted generators return false on
    // the first poll, so this is safe after a mid-stream drain too.
    if task.mode() == TaskMode::Reductor {
        if let Some(requisition) = &last_requisition {
            drain(task, requisition, &mut outputs)?;
        }
    }

    return Ok(outputs);
}
