//! Hand over of configurations from the producer to build workers.
use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::config::AnalysisConfig;
use crate::configuration::BuilderConfiguration;
use crate::enumerate::ConfigurationSink;
use crate::monitor::{CancelFlag, Monitor};

mod order;

pub use order::{OrderingPolicy, Sorter};

/// Result of pulling from a [`ConfigurationScheduler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetch {
    Ready(BuilderConfiguration),
    /// Nothing available right now, more may follow.
    Pending,
    /// Nothing available and nothing will follow.
    Finished,
}

/// Snapshot of the progress of a build run.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct BuildProgress {
    /// Configurations added by the producer.
    pub emitted: u64,
    /// Configurations built successfully.
    pub built: u64,
    /// Configurations whose build failed.
    pub failed: u64,
    /// Configurations waiting in the buffer.
    pub buffered: usize,
    /// Expected total, when known up front.
    pub expected: Option<u64>,
    pub finished: bool,
    pub canceled: bool,
}

struct SchedulerState {
    sorter: Sorter,
    finished: bool,
    sorted: bool,
    emitted: u64,
    built: u64,
    failed: u64,
    expected: Option<u64>,
}

/// Bounded buffer between one producer and any number of consumers.
///
/// Outside of buffer-first mode the producer blocks while `max_size` configurations are
/// buffered. In buffer-first mode the buffer is unbounded and consumers get nothing until
/// [`sort`](ConfigurationScheduler::sort) fixed the order.
pub struct ConfigurationScheduler {
    state: Mutex<SchedulerState>,
    changed: Condvar,
    max_size: usize,
    buffer_first: bool,
    wait_interval: Duration,
    cancel: CancelFlag,
}

impl ConfigurationScheduler {
    pub fn new(
        policy: OrderingPolicy,
        universe: Vec<String>,
        max_size: usize,
        buffer_first: bool,
    ) -> ConfigurationScheduler {
        ConfigurationScheduler {
            state: Mutex::new(SchedulerState {
                sorter: Sorter::new(policy, universe),
                finished: false,
                sorted: false,
                emitted: 0,
                built: 0,
                failed: 0,
                expected: None,
            }),
            changed: Condvar::new(),
            max_size: max_size.max(1),
            buffer_first,
            wait_interval: Duration::from_secs(1),
            cancel: CancelFlag::new(),
        }
    }

    /// Creates a scheduler with capacity, mode and ordering taken from `config`.
    pub fn from_config(config: &AnalysisConfig, universe: Vec<String>) -> ConfigurationScheduler {
        ConfigurationScheduler::new(
            config.ordering_policy(),
            universe,
            config.scheduler_capacity,
            config.buffer_first,
        )
        .with_wait_interval(config.wait_interval())
    }

    /// Uses a shared cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> ConfigurationScheduler {
        self.cancel = cancel;
        self
    }

    /// Maximal time a blocked caller sleeps before checking for cancellation again.
    pub fn with_wait_interval(mut self, wait_interval: Duration) -> ConfigurationScheduler {
        self.wait_interval = wait_interval;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_buffer_first(&self) -> bool {
        self.buffer_first
    }

    /// Adds a configuration, waiting for free space if necessary.
    ///
    /// Returns `false` when the run was canceled. The configuration is dropped in that case.
    pub fn add_configuration(&self, configuration: BuilderConfiguration) -> bool {
        let mut state = self.state.lock();
        while !self.buffer_first && state.sorter.len() >= self.max_size {
            if self.cancel.is_canceled() {
                return false;
            }
            self.changed.wait_for(&mut state, self.wait_interval);
        }
        if self.cancel.is_canceled() {
            return false;
        }

        state.sorter.add(configuration);
        state.emitted += 1;
        self.changed.notify_all();
        true
    }

    /// Removes the next configuration without waiting.
    pub fn get_configuration(&self) -> Fetch {
        let mut state = self.state.lock();
        self.fetch(&mut state)
    }

    /// Removes the next configuration, waiting until one is available.
    ///
    /// Returns `None` once the run is finished and drained or canceled.
    pub fn wait_configuration(&self) -> Option<BuilderConfiguration> {
        let mut state = self.state.lock();
        loop {
            match self.fetch(&mut state) {
                Fetch::Ready(configuration) => return Some(configuration),
                Fetch::Finished => return None,
                Fetch::Pending => {
                    self.changed.wait_for(&mut state, self.wait_interval);
                }
            }
        }
    }

    fn fetch(&self, state: &mut SchedulerState) -> Fetch {
        if self.cancel.is_canceled() {
            return Fetch::Finished;
        }
        if self.buffer_first && !state.sorted {
            return if state.finished && state.sorter.is_empty() {
                Fetch::Finished
            } else {
                Fetch::Pending
            };
        }
        match state.sorter.pop() {
            Some(configuration) => {
                self.changed.notify_all();
                Fetch::Ready(configuration)
            }
            None if state.finished => Fetch::Finished,
            None => Fetch::Pending,
        }
    }

    /// Fixes the order of all buffered configurations and releases them to consumers.
    pub fn sort(&self) {
        let mut state = self.state.lock();
        let count = state.sorter.sort();
        state.sorted = true;
        debug!("Sorted {} buffered configurations", count);
        self.changed.notify_all();
    }

    /// Signals that no further configurations will be added.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if !state.finished {
            state.finished = true;
            debug!("Producer finished after {} configurations", state.emitted);
            self.changed.notify_all();
        }
    }

    /// Cancels the run and wakes up everyone waiting.
    pub fn cancel(&self) {
        let _state = self.state.lock();
        self.cancel.cancel();
        self.changed.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Records the outcome of one build.
    pub fn record_build(&self, success: bool) {
        let mut state = self.state.lock();
        if success {
            state.built += 1;
        } else {
            state.failed += 1;
        }
    }

    /// Sets the expected number of configurations.
    pub fn set_expected(&self, expected: Option<u64>) {
        self.state.lock().expected = expected;
    }

    pub fn buffer_size(&self) -> usize {
        self.state.lock().sorter.len()
    }

    pub fn progress(&self) -> BuildProgress {
        let state = self.state.lock();
        BuildProgress {
            emitted: state.emitted,
            built: state.built,
            failed: state.failed,
            buffered: state.sorter.len(),
            expected: state.expected,
            finished: state.finished,
            canceled: self.cancel.is_canceled(),
        }
    }
}

impl<'a> ConfigurationSink for &'a ConfigurationScheduler {
    fn add_configuration(&mut self, configuration: BuilderConfiguration) -> bool {
        ConfigurationScheduler::add_configuration(*self, configuration)
    }
}
