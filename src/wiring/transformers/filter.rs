use super::OPERATOR_INPUT;
use crate::error::Result;
use crate::wiring::input::InputWire;
use crate::wiring::model::WiringModel;
use crate::wiring::output::OutputWire;

/// Forwards an item unchanged iff the predicate holds for it
pub struct WireFilter<T> {
    input: InputWire<T, T>,
    output: OutputWire<T>,
}

impl<T> WireFilter<T>
where
    T: Clone + Send + 'static,
{
    /// Register a filter named `name` keeping items that satisfy `predicate`
    pub fn new<F>(model: &WiringModel, name: &str, predicate: F) -> Result<Self>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let scheduler = model.scheduler_builder(name)?.unbounded().build::<T>()?;
        let input = scheduler.build_input_wire(OPERATOR_INPUT)?;
        input.bind(move |item| predicate(&item).then_some(item))?;
        Ok(Self {
            input,
            output: scheduler.output_wire().clone(),
        })
    }

    pub fn input_wire(&self) -> &InputWire<T, T> {
        &self.input
    }

    pub fn output_wire(&self) -> &OutputWire<T> {
        &self.output
    }
}
