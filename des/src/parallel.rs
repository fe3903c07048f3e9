//! Run independent EventLoop scenarios on a rayon pool.
//!
//! Each scenario is built from its index by a builder closure, so seeding
//! the agents from that index keeps results reproducible regardless of the
//! number of threads or the order in which scenarios finish. Results come
//! back in scenario order.
//!
//! ```rust
//! use des::parallel::ParallelRunner;
//! use des::{Agent, EventLoop};
//!
//! struct Idle(usize);
//! impl Agent<u8, usize> for Idle {
//!     fn stats(&self) -> usize {
//!         self.0
//!     }
//! }
//!
//! let results = ParallelRunner::new(4, |scenario_id| {
//!     let agents: Vec<Box<dyn Agent<u8, usize>>> = vec![Box::new(Idle(scenario_id))];
//!     EventLoop::new(vec![(0, 1)], agents)
//! })
//! .num_threads(2)
//! .run(10);
//!
//! assert_eq!(results.len(), 4);
//! assert_eq!(results[3], Ok(vec![3]));
//! ```

use crate::EventLoop;
use rayon::prelude::*;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Builder-style runner for a batch of scenarios
pub struct ParallelRunner<T, S, F>
where
    F: Fn(usize) -> EventLoop<T, S> + Send + Sync,
    S: Send,
{
    num_scenarios: usize,
    builder: F,
    num_threads: Option<usize>,
    progress: Option<ProgressCallback>,
    _marker: PhantomData<fn() -> (T, S)>,
}

impl<T, S, F> ParallelRunner<T, S, F>
where
    F: Fn(usize) -> EventLoop<T, S> + Send + Sync,
    S: Send,
{
    pub fn new(num_scenarios: usize, builder: F) -> Self {
        ParallelRunner {
            num_scenarios,
            builder,
            num_threads: None,
            progress: None,
            _marker: PhantomData,
        }
    }

    /// Use a dedicated pool of `n` threads instead of rayon's global pool
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Called with `(completed, total)` each time a scenario finishes
    pub fn progress<P>(mut self, callback: P) -> Self
    where
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Run every scenario until `run_until` and collect agent stats.
    ///
    /// A panicking scenario yields `Err` with the panic message; the rest of
    /// the batch is unaffected.
    pub fn run(self, run_until: usize) -> Vec<Result<Vec<S>, String>> {
        let completed = AtomicUsize::new(0);

        let execute = || {
            (0..self.num_scenarios)
                .into_par_iter()
                .map(|scenario_id| {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        let mut event_loop = (self.builder)(scenario_id);
                        event_loop.run(run_until);
                        event_loop.stats()
                    }));

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = &self.progress {
                        callback(done, self.num_scenarios);
                    }

                    result.map_err(panic_message)
                })
                .collect()
        };

        // Fall back to the global pool if a dedicated one cannot be built
        match self
            .num_threads
            .and_then(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build().ok())
        {
            Some(pool) => pool.install(execute),
            None => execute(),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `num_scenarios` scenarios on the global pool
pub fn run_parallel<T, S, F>(
    num_scenarios: usize,
    builder: F,
    run_until: usize,
) -> Vec<Result<Vec<S>, String>>
where
    F: Fn(usize) -> EventLoop<T, S> + Send + Sync,
    S: Send,
{
    ParallelRunner::new(num_scenarios, builder).run(run_until)
}
