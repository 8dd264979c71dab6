use super::OPERATOR_INPUT;
use crate::error::Result;
use crate::wiring::input::InputWire;
use crate::wiring::model::WiringModel;
use crate::wiring::output::OutputWire;

/// Applies a function to each item and forwards the result, if there is one
pub struct WireTransformer<A, B> {
    input: InputWire<A, B>,
    output: OutputWire<B>,
}

impl<A, B> WireTransformer<A, B>
where
    A: Send + 'static,
    B: Clone + Send + 'static,
{
    /// Register a transformer named `name` applying `transform`
    pub fn new<F>(model: &WiringModel, name: &str, transform: F) -> Result<Self>
    where
        F: Fn(A) -> Option<B> + Send + Sync + 'static,
    {
        let scheduler = model.scheduler_builder(name)?.unbounded().build::<B>()?;
        let input = scheduler.build_input_wire(OPERATOR_INPUT)?;
        input.bind(transform)?;
        Ok(Self {
            input,
            output: scheduler.output_wire().clone(),
        })
    }

    pub fn input_wire(&self) -> &InputWire<A, B> {
        &self.input
    }

    pub fn output_wire(&self) -> &OutputWire<B> {
        &self.output
    }
}
