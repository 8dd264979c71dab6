use crate::error::Result;
use crate::wiring::input::WireSink;
use crate::wiring::model::WiringModel;
use crate::wiring::transformers::{WireFilter, WireListSplitter, WireTransformer};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How data travels over a solder edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolderType {
    /// Respect the destination's capacity, holding the sender back when full
    Put,
    /// Bypass the destination's capacity entirely
    Inject,
    /// Drop the data if the destination is full
    Offer,
}

enum Subscriber<T> {
    Wire {
        sink: Arc<dyn WireSink<T>>,
        solder_type: SolderType,
    },
    Consumer(Box<dyn Fn(T) + Send + Sync>),
}

impl<T> Subscriber<T> {
    fn deliver(&self, data: T) -> Result<()> {
        match self {
            Subscriber::Wire { sink, solder_type } => match solder_type {
                SolderType::Put => sink.put(data),
                SolderType::Inject => sink.inject(data),
                SolderType::Offer => sink.offer(data).map(|_| ()),
            },
            Subscriber::Consumer(consumer) => {
                consumer(data);
                Ok(())
            }
        }
    }
}

struct OutputCore<T> {
    model: WiringModel,
    scheduler_name: String,
    subscribers: RwLock<Vec<Subscriber<T>>>,
}

/// Distributes a scheduler's results to everything soldered to it.
///
/// Soldering happens while the graph is assembled; afterwards only data flows.
/// Cloning is cheap and clones share subscribers.
pub struct OutputWire<T> {
    core: Arc<OutputCore<T>>,
}

impl<T> Clone for OutputWire<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> OutputWire<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(model: WiringModel, scheduler_name: String) -> Self {
        Self {
            core: Arc::new(OutputCore {
                model,
                scheduler_name,
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Name of the scheduler this output belongs to
    pub fn scheduler_name(&self) -> &str {
        &self.core.scheduler_name
    }

    /// The model every edge soldered from this output is recorded in
    pub fn model(&self) -> &WiringModel {
        &self.core.model
    }

    /// Solder to an input wire, respecting its capacity
    pub fn solder_to<W>(&self, destination: &W) -> Result<()>
    where
        W: WireSink<T> + Clone + 'static,
    {
        self.solder_with(Arc::new(destination.clone()), SolderType::Put)
    }

    /// Solder to an input wire, bypassing its capacity
    pub fn inject_to<W>(&self, destination: &W) -> Result<()>
    where
        W: WireSink<T> + Clone + 'static,
    {
        self.solder_with(Arc::new(destination.clone()), SolderType::Inject)
    }

    /// Solder to several destinations with the same solder type
    pub fn solder_to_all<I>(&self, destinations: I, solder_type: SolderType) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn WireSink<T>>>,
    {
        for destination in destinations {
            self.solder_with(destination, solder_type)?;
        }
        Ok(())
    }

    /// Solder to a sink, choosing how data is delivered
    pub fn solder_with(&self, sink: Arc<dyn WireSink<T>>, solder_type: SolderType) -> Result<()> {
        self.core.model.register_edge(
            &self.core.scheduler_name,
            sink.scheduler_name(),
            sink.wire_name(),
            solder_type,
        )?;
        debug!(
            from = %self.core.scheduler_name,
            to = sink.scheduler_name(),
            wire = sink.wire_name(),
            ?solder_type,
            "soldered"
        );
        self.core
            .subscribers
            .write()
            .push(Subscriber::Wire { sink, solder_type });
        Ok(())
    }

    /// Solder to a terminal consumer function, registered in the model under `name`
    pub fn solder_to_consumer<F>(&self, name: &str, consumer: F) -> Result<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.core
            .model
            .register_consumer(&self.core.scheduler_name, name)?;
        self.core
            .subscribers
            .write()
            .push(Subscriber::Consumer(Box::new(consumer)));
        Ok(())
    }

    /// Send `data` to every subscriber in soldering order.
    ///
    /// Every subscriber is tried even if an earlier one fails; the first
    /// error is returned.
    pub fn forward(&self, data: T) -> Result<()> {
        // Recursive read: a cyclic graph may forward through this wire again
        // on the same thread.
        let subscribers = self.core.subscribers.read_recursive();
        let Some((last, rest)) = subscribers.split_last() else {
            return Ok(());
        };
        let mut outcome = Ok(());
        for subscriber in rest {
            let result = subscriber.deliver(data.clone());
            if outcome.is_ok() {
                outcome = result;
            }
        }
        let result = last.deliver(data);
        outcome.and(result)
    }

    /// Number of wires and consumers soldered to this output
    pub fn subscriber_count(&self) -> usize {
        self.core.subscribers.read().len()
    }

    /// Solder a new transformer to this output and return the transformer's output
    pub fn build_transformer<B, F>(&self, name: &str, transform: F) -> Result<OutputWire<B>>
    where
        B: Clone + Send + 'static,
        F: Fn(T) -> Option<B> + Send + Sync + 'static,
    {
        let transformer = WireTransformer::new(&self.core.model, name, transform)?;
        self.solder_to(transformer.input_wire())?;
        Ok(transformer.output_wire().clone())
    }

    /// Solder a new filter to this output and return the filter's output
    pub fn build_filter<F>(&self, name: &str, predicate: F) -> Result<OutputWire<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let filter = WireFilter::new(&self.core.model, name, predicate)?;
        self.solder_to(filter.input_wire())?;
        Ok(filter.output_wire().clone())
    }
}

impl<E> OutputWire<Vec<E>>
where
    E: Clone + Send + 'static,
{
    /// Solder a new list splitter to this output and return the element output
    pub fn build_splitter(&self, name: &str) -> Result<OutputWire<E>> {
        let splitter = WireListSplitter::new(&self.core.model, name)?;
        self.solder_to(splitter.input_wire())?;
        Ok(splitter.output_wire().clone())
    }
}

impl<T> fmt::Debug for OutputWire<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputWire")
            .field("scheduler", &self.core.scheduler_name)
            .field("subscribers", &self.core.subscribers.read().len())
            .finish()
    }
}
