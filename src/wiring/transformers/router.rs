use super::OPERATOR_INPUT;
use crate::error::{Result, WiringError};
use crate::wiring::input::InputWire;
use crate::wiring::model::WiringModel;
use crate::wiring::output::OutputWire;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// A closed set of routing destinations.
///
/// `ADDRESSES` lists every address in declaration order, and each address's
/// `ordinal` must equal its position in that list. The
/// [`router_address!`](crate::router_address) macro derives both.
pub trait RouterAddress: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ADDRESSES: &'static [Self];

    /// Position of this address in `ADDRESSES`
    fn ordinal(self) -> usize;
}

/// Declare an enum usable as a [`RouterAddress`]
#[macro_export]
macro_rules! router_address {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::wiring::RouterAddress for $name {
            const ADDRESSES: &'static [Self] = &[$($name::$variant),+];

            fn ordinal(self) -> usize {
                self as usize
            }
        }
    };
}

/// A payload tagged with the output it should be routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutableData<R, D> {
    pub address: R,
    pub data: D,
}

impl<R, D> RoutableData<R, D> {
    /// Tag `data` for delivery to `address`
    pub fn new(address: R, data: D) -> Self {
        Self { address, data }
    }
}

/// Sends each payload to the one output belonging to its address
pub struct WireRouter<R, D> {
    input: InputWire<RoutableData<R, D>, ()>,
    outputs: Arc<Vec<OutputWire<D>>>,
}

impl<R, D> WireRouter<R, D>
where
    R: RouterAddress,
    D: Clone + Send + 'static,
{
    /// Build a router with one output per address of `R`.
    /// Fails if `R`'s addresses are empty or out of order.
    pub fn new(model: &WiringModel, name: &str) -> Result<Self> {
        validate_addresses::<R>()?;
        let scheduler = model.scheduler_builder(name)?.unbounded().build::<()>()?;
        let outputs: Arc<Vec<OutputWire<D>>> = Arc::new(
            R::ADDRESSES
                .iter()
                .map(|_| OutputWire::new(model.clone(), name.to_string()))
                .collect(),
        );

        let input = scheduler.build_input_wire(OPERATOR_INPUT)?;
        let routes = Arc::clone(&outputs);
        input.bind_emitter(move |routable: RoutableData<R, D>, _: &OutputWire<()>| {
            route(&routes, routable.address)?.forward(routable.data)
        })?;
        Ok(Self { input, outputs })
    }

    /// The wire routable data is put into
    pub fn input_wire(&self) -> &InputWire<RoutableData<R, D>, ()> {
        &self.input
    }

    /// The output carrying payloads addressed to `address`
    pub fn output_wire(&self, address: R) -> Result<&OutputWire<D>> {
        route(&self.outputs, address)
    }
}

fn route<R: RouterAddress, D>(outputs: &[OutputWire<D>], address: R) -> Result<&OutputWire<D>> {
    outputs.get(address.ordinal()).ok_or_else(|| {
        error!(?address, "router address outside its enumeration");
        WiringError::InvalidRouterAddresses(format!("{address:?} has no output"))
    })
}

fn validate_addresses<R: RouterAddress>() -> Result<()> {
    if R::ADDRESSES.is_empty() {
        return Err(WiringError::InvalidRouterAddresses(
            "address enumeration is empty".into(),
        ));
    }
    for (position, address) in R::ADDRESSES.iter().enumerate() {
        if address.ordinal() != position {
            return Err(WiringError::InvalidRouterAddresses(format!(
                "{address:?} has ordinal {} but is declared at position {position}",
                address.ordinal()
            )));
        }
    }
    Ok(())
}

impl<R, D> OutputWire<RoutableData<R, D>>
where
    R: RouterAddress,
    D: Clone + Send + 'static,
{
    /// Solder a new router to this output and return it
    pub fn build_router(&self, name: &str) -> Result<WireRouter<R, D>> {
        let router = WireRouter::new(self.model(), name)?;
        self.solder_to(router.input_wire())?;
        Ok(router)
    }
}
