use crate::backpressure::BackpressureCounter;
use crate::cancel::Cancellation;
use crate::error::{Result, WiringError};
use crate::metrics::SchedulerMetrics;
use crate::wiring::input::InputWire;
use crate::wiring::model::{validate_name, WiringModel};
use crate::wiring::output::OutputWire;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Builder for a [`TaskScheduler`], obtained from [`WiringModel::scheduler_builder`]
pub struct TaskSchedulerBuilder {
    model: WiringModel,
    name: String,
    unhandled_task_capacity: Option<u64>,
    max_backoff_sleep: Duration,
}

impl TaskSchedulerBuilder {
    pub(crate) fn new(
        model: WiringModel,
        name: String,
        unhandled_task_capacity: Option<u64>,
        max_backoff_sleep: Duration,
    ) -> Self {
        Self {
            model,
            name,
            unhandled_task_capacity,
            max_backoff_sleep,
        }
    }

    /// Bound the number of tasks in flight. Callers that `put` into a full
    /// scheduler are held back; injected data is always admitted.
    pub fn with_unhandled_task_capacity(mut self, capacity: u64) -> Self {
        self.unhandled_task_capacity = Some(capacity.max(1));
        self
    }

    /// Remove any capacity bound
    pub fn unbounded(mut self) -> Self {
        self.unhandled_task_capacity = None;
        self
    }

    /// Build and register the scheduler
    pub fn build<OUT>(self) -> Result<TaskScheduler<OUT>>
    where
        OUT: Clone + Send + 'static,
    {
        let metrics = SchedulerMetrics::new();
        self.model
            .register_scheduler(&self.name, self.unhandled_task_capacity, metrics.clone())?;
        let core = Arc::new(SchedulerCore {
            name: self.name,
            counter: BackpressureCounter::with_capacity(
                self.unhandled_task_capacity,
                self.max_backoff_sleep,
            ),
            squelching: AtomicBool::new(false),
            metrics,
        });
        let output = OutputWire::new(self.model.clone(), core.name.clone());
        Ok(TaskScheduler {
            core,
            model: self.model,
            output,
        })
    }
}

/// State shared by a scheduler and every input wire built on it
#[derive(Debug)]
pub(crate) struct SchedulerCore {
    pub(crate) name: String,
    pub(crate) counter: BackpressureCounter,
    squelching: AtomicBool,
    pub(crate) metrics: SchedulerMetrics,
}

impl SchedulerCore {
    pub(crate) fn is_squelching(&self) -> bool {
        self.squelching.load(Ordering::Acquire)
    }
}

/// A direct, thread-safe task scheduler.
///
/// There is no queue and no worker thread: handlers run on whichever thread
/// puts data into one of the scheduler's input wires, possibly on many threads
/// at once, so handlers must be thread-safe and quick. Whatever a handler
/// returns is forwarded to the primary output wire before `put` returns.
#[derive(Clone)]
pub struct TaskScheduler<OUT> {
    core: Arc<SchedulerCore>,
    model: WiringModel,
    output: OutputWire<OUT>,
}

impl<OUT> TaskScheduler<OUT>
where
    OUT: Clone + Send + 'static,
{
    /// The name this scheduler was registered under
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Create a new input wire. Each input wire is bound to its own handler.
    pub fn build_input_wire<IN>(&self, name: &str) -> Result<InputWire<IN, OUT>>
    where
        IN: Send + 'static,
    {
        validate_name(name)?;
        Ok(InputWire::new(
            name.to_string(),
            Arc::clone(&self.core),
            self.output.clone(),
        ))
    }

    /// The primary output wire
    pub fn output_wire(&self) -> &OutputWire<OUT> {
        &self.output
    }

    /// The model this scheduler is registered in
    pub fn model(&self) -> &WiringModel {
        &self.model
    }

    /// Tasks that have entered this scheduler and not yet finished
    pub fn unprocessed_task_count(&self) -> u64 {
        self.core.counter.count()
    }

    /// Bound on tasks in flight; `None` if unbounded
    pub fn unhandled_task_capacity(&self) -> Option<u64> {
        self.core.counter.capacity()
    }

    /// Counters and latencies of the tasks this scheduler has run
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.core.metrics
    }

    /// Block until every task currently in flight has finished
    pub fn flush(&self, cancel: &Cancellation) -> Result<()> {
        self.core.counter.wait_until_empty(cancel)
    }

    /// Discard incoming tasks without running handlers until squelching stops.
    /// Fails if squelching is already active.
    pub fn start_squelching(&self) -> Result<()> {
        self.set_squelching(true)
    }

    /// Resume running handlers. Fails if squelching is not active.
    pub fn stop_squelching(&self) -> Result<()> {
        self.set_squelching(false)
    }

    /// True while incoming tasks are being discarded
    pub fn is_squelching(&self) -> bool {
        self.core.is_squelching()
    }

    fn set_squelching(&self, active: bool) -> Result<()> {
        if self
            .core
            .squelching
            .compare_exchange(!active, active, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let state = if active { "active" } else { "inactive" };
            error!(scheduler = %self.core.name, state, "squelching already in requested state");
            return Err(WiringError::SquelchState {
                scheduler: self.core.name.clone(),
                state,
            });
        }
        debug!(scheduler = %self.core.name, active, "squelching changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squelch_transitions() {
        let model = WiringModel::new();
        let scheduler = model.scheduler_builder("A").unwrap().build::<u32>().unwrap();
        assert!(scheduler.stop_squelching().is_err());
        scheduler.start_squelching().unwrap();
        assert!(scheduler.is_squelching());
        assert!(matches!(
            scheduler.start_squelching(),
            Err(WiringError::SquelchState { state: "active", .. })
        ));
        scheduler.stop_squelching().unwrap();
        assert!(!scheduler.is_squelching());
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        let model = WiringModel::new();
        let scheduler = model
            .scheduler_builder("A")
            .unwrap()
            .with_unhandled_task_capacity(0)
            .build::<u32>()
            .unwrap();
        assert_eq!(scheduler.unhandled_task_capacity(), Some(1));
    }

    #[test]
    fn test_input_wire_name_validated() {
        let model = WiringModel::new();
        let scheduler = model.scheduler_builder("A").unwrap().build::<u32>().unwrap();
        assert!(scheduler.build_input_wire::<u32>("bad name").is_err());
        assert!(scheduler.build_input_wire::<u32>("events").is_ok());
    }
}
