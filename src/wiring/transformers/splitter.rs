use super::OPERATOR_INPUT;
use crate::error::Result;
use crate::wiring::input::InputWire;
use crate::wiring::model::WiringModel;
use crate::wiring::output::OutputWire;

/// Forwards each element of a collection individually, in iteration order.
///
/// Forwarding stops at the first element a downstream stage rejects.
pub struct WireCollectionSplitter<C, T> {
    input: InputWire<C, T>,
    output: OutputWire<T>,
}

/// A splitter over ordered lists; elements leave in index order
pub type WireListSplitter<T> = WireCollectionSplitter<Vec<T>, T>;

impl<C, T> WireCollectionSplitter<C, T>
where
    C: IntoIterator<Item = T> + Send + 'static,
    T: Clone + Send + 'static,
{
    /// Register a splitter named `name`
    pub fn new(model: &WiringModel, name: &str) -> Result<Self> {
        let scheduler = model.scheduler_builder(name)?.unbounded().build::<T>()?;
        let input = scheduler.build_input_wire(OPERATOR_INPUT)?;
        input.bind_emitter(|collection: C, output: &OutputWire<T>| {
            for element in collection {
                output.forward(element)?;
            }
            Ok(())
        })?;
        Ok(Self {
            input,
            output: scheduler.output_wire().clone(),
        })
    }

    pub fn input_wire(&self) -> &InputWire<C, T> {
        &self.input
    }

    /// Carries the individual elements
    pub fn output_wire(&self) -> &OutputWire<T> {
        &self.output
    }
}
