use crate::error::{Result, WiringError};
use crate::wiring::output::OutputWire;
use crate::wiring::scheduler::SchedulerCore;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{error, trace};

type MapHandler<IN, OUT> = Box<dyn Fn(IN) -> Option<OUT> + Send + Sync>;
type EmitHandler<IN, OUT> = Box<dyn Fn(IN, &OutputWire<OUT>) -> Result<()> + Send + Sync>;

enum Handler<IN, OUT> {
    /// Returns at most one value, forwarded to the primary output
    Map(MapHandler<IN, OUT>),
    /// Forwards any number of values itself
    Emit(EmitHandler<IN, OUT>),
}

/// Anything an output wire can be soldered to
pub trait WireSink<T>: Send + Sync {
    /// Deliver, respecting the destination's capacity
    fn put(&self, data: T) -> Result<()>;

    /// Deliver, ignoring the destination's capacity
    fn inject(&self, data: T) -> Result<()>;

    /// Deliver only if the destination has room right now
    fn offer(&self, data: T) -> Result<bool>;

    /// Name of the scheduler that owns this sink
    fn scheduler_name(&self) -> &str;

    /// Name of the wire, used as the edge label in the model
    fn wire_name(&self) -> &str;
}

struct InputWireCore<IN, OUT> {
    name: String,
    scheduler: Arc<SchedulerCore>,
    output: OutputWire<OUT>,
    handler: OnceLock<Handler<IN, OUT>>,
}

/// A typed entry point into a [`TaskScheduler`](crate::wiring::TaskScheduler).
///
/// Must be bound exactly once before data is put into it. Cloning is cheap.
pub struct InputWire<IN, OUT> {
    core: Arc<InputWireCore<IN, OUT>>,
}

impl<IN, OUT> Clone for InputWire<IN, OUT> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Leaves the scheduler's counter when a task ends, however it ends
struct RampGuard<'a>(&'a SchedulerCore);

impl Drop for RampGuard<'_> {
    fn drop(&mut self) {
        self.0.counter.off_ramp();
    }
}

impl<IN, OUT> InputWire<IN, OUT>
where
    IN: Send + 'static,
    OUT: Clone + Send + 'static,
{
    pub(crate) fn new(name: String, scheduler: Arc<SchedulerCore>, output: OutputWire<OUT>) -> Self {
        Self {
            core: Arc::new(InputWireCore {
                name,
                scheduler,
                output,
                handler: OnceLock::new(),
            }),
        }
    }

    /// Bind the handler. A `None` result forwards nothing.
    pub fn bind<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(IN) -> Option<OUT> + Send + Sync + 'static,
    {
        self.set_handler(Handler::Map(Box::new(handler)))
    }

    /// Bind a handler that produces no output
    pub fn bind_consumer<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(IN) + Send + Sync + 'static,
    {
        self.bind(move |data| {
            consumer(data);
            None
        })
    }

    /// Bind a handler that forwards to the output wire itself, any number of times
    pub(crate) fn bind_emitter<F>(&self, emitter: F) -> Result<()>
    where
        F: Fn(IN, &OutputWire<OUT>) -> Result<()> + Send + Sync + 'static,
    {
        self.set_handler(Handler::Emit(Box::new(emitter)))
    }

    fn set_handler(&self, handler: Handler<IN, OUT>) -> Result<()> {
        self.core.handler.set(handler).map_err(|_| {
            error!(wire = %self.core.name, "input wire bound twice");
            WiringError::AlreadyBound {
                wire: self.core.name.clone(),
            }
        })
    }

    /// True once a handler has been bound
    pub fn is_bound(&self) -> bool {
        self.core.handler.get().is_some()
    }

    /// The wire's name, unique within its scheduler by convention
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Put data in, waiting for room if the scheduler is at capacity.
    /// The wait is not interruptible.
    pub fn put(&self, data: IN) -> Result<()> {
        let handler = self.handler()?;
        if self.core.scheduler.counter.on_ramp() {
            self.core.scheduler.metrics.record_held_back();
        }
        self.handle(handler, data)
    }

    /// Put data in regardless of the scheduler's capacity
    pub fn inject(&self, data: IN) -> Result<()> {
        let handler = self.handler()?;
        self.core.scheduler.counter.forced_on_ramp();
        self.handle(handler, data)
    }

    /// Put data in only if the scheduler has room now; otherwise drop it and
    /// return false
    pub fn offer(&self, data: IN) -> Result<bool> {
        let handler = self.handler()?;
        if !self.core.scheduler.counter.attempt_on_ramp() {
            self.core.scheduler.metrics.record_offer_rejected();
            return Ok(false);
        }
        self.handle(handler, data)?;
        Ok(true)
    }

    /// Borrow as a type-erased sink, for soldering from an output wire
    pub fn as_sink(&self) -> Arc<dyn WireSink<IN>> {
        Arc::new(self.clone())
    }

    fn handler(&self) -> Result<&Handler<IN, OUT>> {
        self.core.handler.get().ok_or_else(|| {
            error!(wire = %self.core.name, "data put into unbound input wire");
            WiringError::Unbound {
                wire: self.core.name.clone(),
            }
        })
    }

    fn handle(&self, handler: &Handler<IN, OUT>, data: IN) -> Result<()> {
        let scheduler = &self.core.scheduler;
        let _ramp = RampGuard(scheduler);
        if scheduler.is_squelching() {
            scheduler.metrics.record_squelched();
            trace!(scheduler = %scheduler.name, "task squelched");
            return Ok(());
        }

        // latency covers the handler and the forwarding it triggers, the
        // same span the task occupies a slot
        let start = Instant::now();
        let result = match handler {
            Handler::Map(handler) => match handler(data) {
                Some(output) => self.core.output.forward(output),
                None => Ok(()),
            },
            Handler::Emit(emitter) => emitter(data, &self.core.output),
        };
        scheduler.metrics.record_handled(start.elapsed());
        result
    }
}

impl<IN, OUT> WireSink<IN> for InputWire<IN, OUT>
where
    IN: Send + 'static,
    OUT: Clone + Send + 'static,
{
    fn put(&self, data: IN) -> Result<()> {
        InputWire::put(self, data)
    }

    fn inject(&self, data: IN) -> Result<()> {
        InputWire::inject(self, data)
    }

    fn offer(&self, data: IN) -> Result<bool> {
        InputWire::offer(self, data)
    }

    fn scheduler_name(&self) -> &str {
        &self.core.scheduler.name
    }

    fn wire_name(&self) -> &str {
        &self.core.name
    }
}

impl<IN, OUT> fmt::Debug for InputWire<IN, OUT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputWire")
            .field("name", &self.core.name)
            .field("scheduler", &self.core.scheduler.name)
            .field("bound", &self.core.handler.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::WiringError;
    use crate::wiring::{WireListSplitter, WiringModel};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_unbound_put_rejected() {
        let model = WiringModel::new();
        let scheduler = model.scheduler_builder("A").unwrap().build::<u32>().unwrap();
        let input = scheduler.build_input_wire::<u32>("in").unwrap();
        assert_eq!(
            input.put(1),
            Err(WiringError::Unbound { wire: "in".into() })
        );
        assert_eq!(scheduler.unprocessed_task_count(), 0);
    }

    #[test]
    fn test_double_bind_rejected() {
        let model = WiringModel::new();
        let scheduler = model.scheduler_builder("A").unwrap().build::<u32>().unwrap();
        let input = scheduler.build_input_wire::<u32>("in").unwrap();
        input.bind(Some).unwrap();
        assert_eq!(
            input.bind(Some),
            Err(WiringError::AlreadyBound { wire: "in".into() })
        );
        assert!(input.is_bound());
    }

    #[test]
    fn test_squelched_tasks_skip_handler() {
        let model = WiringModel::new();
        let scheduler = model.scheduler_builder("A").unwrap().build::<()>().unwrap();
        let input = scheduler.build_input_wire::<u64>("in").unwrap();
        let sum = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&sum);
        input
            .bind_consumer(move |x| {
                sink.fetch_add(x, Ordering::SeqCst);
            })
            .unwrap();

        input.put(1).unwrap();
        scheduler.start_squelching().unwrap();
        input.put(10).unwrap();
        input.inject(100).unwrap();
        scheduler.stop_squelching().unwrap();
        input.put(1000).unwrap();

        assert_eq!(sum.load(Ordering::SeqCst), 1001);
        assert_eq!(scheduler.metrics().total_squelched(), 2);
        assert_eq!(scheduler.unprocessed_task_count(), 0);
    }

    #[test]
    fn test_offer_refused_when_full() {
        let model = WiringModel::new();
        let scheduler = model
            .scheduler_builder("A")
            .unwrap()
            .with_unhandled_task_capacity(1)
            .build::<()>()
            .unwrap();
        let input = scheduler.build_input_wire::<u32>("in").unwrap();
        let inner = input.clone();
        input
            .bind_consumer(move |x| {
                // re-entrant offer while this task holds the only slot
                if x == 0 {
                    assert_eq!(inner.offer(1), Ok(false));
                }
            })
            .unwrap();

        input.put(0).unwrap();
        assert_eq!(input.offer(2), Ok(true));
        assert_eq!(scheduler.metrics().total_offers_rejected(), 1);
    }

    #[test]
    fn test_latency_includes_forwarding_for_every_handler_kind() {
        let model = WiringModel::new();
        let mapper = model.scheduler_builder("mapper").unwrap().build::<u32>().unwrap();
        let input = mapper.build_input_wire::<u32>("in").unwrap();
        input.bind(Some).unwrap();
        let splitter = WireListSplitter::<u32>::new(&model, "split").unwrap();
        for output in [mapper.output_wire(), splitter.output_wire()] {
            let name = format!("{}Sink", output.scheduler_name());
            output
                .solder_to_consumer(&name, |_| thread::sleep(Duration::from_millis(5)))
                .unwrap();
        }

        input.put(1).unwrap();
        splitter.input_wire().put(vec![1]).unwrap();
        for name in ["mapper", "split"] {
            let snapshot = model.scheduler_metrics(name).unwrap().snapshot();
            assert_eq!(snapshot.total_handled, 1);
            assert!(
                snapshot.latency_p50_us >= 5000.0,
                "{name} latency {}µs should include the downstream sleep",
                snapshot.latency_p50_us
            );
        }
    }
}
