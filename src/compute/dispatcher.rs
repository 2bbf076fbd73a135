use crate::prelude::*;

#[cfg(feature = "threading")]
use rayon::prelude::*;

/// Default number of elements reduced per work group
pub const DEFAULT_WORK_GROUP_SIZE: usize = 256;

/// Work distributor, simplifies the process of splitting workloads across threads
pub struct Dispatcher {
    #[cfg(feature = "threading")]
    _pool: rayon::ThreadPool,
    _async: bool,
    _threads: usize,

    _work_group_size: usize,
}

impl Dispatcher {
    /// Creates a new dispatcher with the provided number of threads (if < 0, will use system thread count)
    ///
    /// A thread count of 0 makes the dispatcher run every workload synchronously
    pub fn new(num_threads: i32) -> Dispatcher {
        #[cfg(feature = "threading")]
        {
            let mut thread_count = num_threads as usize;

            if num_threads < 0 {
                thread_count = std::thread::available_parallelism().unwrap().get();
            }

            let build_result = rayon::ThreadPoolBuilder::new()
                .num_threads(thread_count)
                .build();
            let pool = build_result.expect("Failed to create thread pool!");

            return Dispatcher {
                _pool: pool,
                _async: thread_count != 0,
                _threads: thread_count,
                _work_group_size: DEFAULT_WORK_GROUP_SIZE,
            };
        }

        #[cfg(not(feature = "threading"))]
        {
            return Dispatcher {
                _async: false,
                _threads: 0,
                _work_group_size: DEFAULT_WORK_GROUP_SIZE,
            };
        }
    }

    /// Overrides the work group size used by grouped dispatches
    pub fn with_work_group_size(mut self, size: usize) -> Dispatcher {
        assert!(size > 0);
        self._work_group_size = size;
        return self;
    }

    /// Returns the amount of allocated threads
    pub fn get_thread_count(&self) -> usize {
        return self._threads;
    }

    /// Returns the number of elements each work group covers
    pub fn work_group_size(&self) -> usize {
        return self._work_group_size;
    }

    fn row_input(buffer: &Buffer, row: usize) -> KernelInput {
        let width = buffer.requisition().width();
        let height = buffer.requisition().height();

        return KernelInput {
            thread_x: 0,
            thread_y: row % height,
            thread_z: row / height,

            buffer_width: width,
            buffer_height: height,
            buffer_depth: buffer.requisition().depth(),
        };
    }

    /// Runs a kernel over every element of the output buffer, splitting the
    /// work across rows
    pub fn do_tiles<TK: Kernel>(&self, kernel: &TK, buffer: &mut Buffer) {
        let width = buffer.requisition().width();
        let inputs: Vec<KernelInput> = (0..buffer.len() / width)
            .map(|row| Dispatcher::row_input(buffer, row))
            .collect();

        if self._async {
            #[cfg(feature = "threading")]
            self._pool.install(|| {
                buffer
                    .host_mut()
                    .par_chunks_mut(width)
                    .zip(inputs.par_iter())
                    .for_each(|(row, input)| {
                        for (x, texel) in row.iter_mut().enumerate() {
                            let mut input_copy = *input;
                            input_copy.thread_x = x;
                            *texel = kernel.kernel_exec(input_copy);
                        }
                    });
            });

            #[cfg(not(feature = "threading"))]
            panic!("Attempted to do async dispatching when compiled without async support!");
        } else {
            for (row, input) in buffer.host_mut().chunks_mut(width).zip(inputs.iter()) {
                for (x, texel) in row.iter_mut().enumerate() {
                    let mut input_copy = *input;
                    input_copy.thread_x = x;
                    *texel = kernel.kernel_exec(input_copy);
                }
            }
        }
    }

    /// Evaluates one value per work group, returning them in group order
    pub fn map_groups<TF>(&self, num_groups: usize, func: TF) -> Vec<f32>
    where
        TF: Fn(usize) -> f32 + Send + Sync,
    {
        if self._async {
            #[cfg(feature = "threading")]
            return self
                ._pool
                .install(|| (0..num_groups).into_par_iter().map(func).collect());

            #[cfg(not(feature = "threading"))]
            panic!("Attempted to do async dispatching when compiled without async support!");
        }

        return (0..num_groups).map(func).collect();
    }

    /// Runs one job per item, each scribbling into a shared tally of
    /// saturating counters, and merges the per-thread tallies at the end
    pub fn fold_tallies<TF>(&self, tally_len: usize, num_items: usize, job: TF) -> Vec<u16>
    where
        TF: Fn(usize, &mut [u16]) + Send + Sync,
    {
        if self._async {
            #[cfg(feature = "threading")]
            return self._pool.install(|| {
                (0..num_items)
                    .into_par_iter()
                    .fold(
                        || vec![0u16; tally_len],
                        |mut tally, item| {
                            job(item, &mut tally);
                            tally
                        },
                    )
                    .reduce(
                        || vec![0u16; tally_len],
                        |mut merged, tally| {
                            for (count, partial) in merged.iter_mut().zip(tally.iter()) {
                                *count = count.saturating_add(*partial);
                            }
                            merged
                        },
                    )
            });

            #[cfg(not(feature = "threading"))]
            panic!("Attempted to do async dispatching when compiled without async support!");
        }

        let mut tally = vec![0u16; tally_len];
        for item in 0..num_items {
            job(item, &mut tally);
        }

        return tally;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CoordSum {}

    impl Kernel for CoordSum {
        fn kernel_exec(&self, input: KernelInput) -> f32 {
            return (input.thread_x + input.thread_y * 10 + input.thread_z * 100) as f32;
        }
    }

    #[test]
    fn do_tiles_addresses_every_texel() {
        let dispatcher = Dispatcher::new(0);
        let mut buffer = Buffer::new(Requisition::new_3d(3, 2, 2));

        dispatcher.do_tiles(&CoordSum {}, &mut buffer);

        assert_eq!(buffer.read(2, 1, 0), 12.0);
        assert_eq!(buffer.read(0, 0, 1), 100.0);
        assert_eq!(buffer.read(2, 1, 1), 112.0);
    }

    #[cfg(feature = "threading")]
    #[test]
    fn async_matches_sync_output() {
        let sync = Dispatcher::new(0);
        let parallel = Dispatcher::new(-1);

        let mut a = Buffer::new(Requisition::new_2d(17, 9));
        let mut b = Buffer::new(Requisition::new_2d(17, 9));

        sync.do_tiles(&CoordSum {}, &mut a);
        parallel.do_tiles(&CoordSum {}, &mut b);

        assert_eq!(a.host(), b.host());
    }

    #[test]
    fn map_groups_preserves_order() {
        let dispatcher = Dispatcher::new(-1);
        let values = dispatcher.map_groups(5, |group| (group * group) as f32);
        assert_eq!(values, vec![0.0, 1.0, 4.0, 9.0, 16.0]);
    }

    #[test]
    fn fold_tallies_merges_counts() {
        let dispatcher = Dispatcher::new(-1);
        let tally = dispatcher.fold_tallies(4, 8, |item, tally| {
            tally[item % 4] = tally[item % 4].saturating_add(1);
        });
        assert_eq!(tally, vec![2, 2, 2, 2]);
    }
}
