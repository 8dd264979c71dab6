//! Event intake graph with per-peer backpressure accounting
//!
//! Graph:
//! 1. batches: receives lists of gossiped events
//! 2. split: forwards events one at a time
//! 3. notStale: drops events older than the current round
//! 4. classify + router: sends self events and peer events to different sinks
//!
//! Usage: cargo run --example intake_pipeline --release

use gossip_backbone::wiring::{RoutableData, WiringModel};
use gossip_backbone::{
    router_address, BackboneConfig, NodeId, PeerBackpressureLedger, WiringError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

router_address! {
    enum Destination { SelfEvents, PeerEvents }
}

#[derive(Debug, Clone)]
struct GossipEvent {
    creator: NodeId,
    round: u64,
    received_from: Option<NodeId>,
}

const SELF_ID: NodeId = NodeId(0);
const CURRENT_ROUND: u64 = 10;

/// Keeps the first ledger violation seen inside a handler, which cannot
/// return it, so `main` can fail with it once the graph has drained
#[derive(Default)]
struct Violations(Mutex<Option<WiringError>>);

impl Violations {
    fn record(&self, result: gossip_backbone::Result<()>) {
        if let Err(err) = result {
            error!(%err, "intake ledger out of step");
            self.0.lock().get_or_insert(err);
        }
    }

    fn check(&self) -> gossip_backbone::Result<()> {
        self.0.lock().take().map_or(Ok(()), Err)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gossip_backbone=info")),
        )
        .init();

    let config: BackboneConfig = toml::from_str("default_unhandled_task_capacity = 64")?;
    config.validate()?;
    let model = WiringModel::with_config(&config);
    let ledger = Arc::new(PeerBackpressureLedger::new());
    ledger.pre_register((1..=4).map(NodeId));

    let intake = model.scheduler_builder("batches")?.build::<Vec<GossipEvent>>()?;
    let batches = intake.build_input_wire::<Vec<GossipEvent>>("received")?;
    let entered = Arc::clone(&ledger);
    batches.bind(move |batch| {
        for event in &batch {
            entered.event_entered(event.received_from);
        }
        Some(batch)
    })?;

    let violations = Arc::new(Violations::default());
    let (stale_ledger, stale_violations) = (Arc::clone(&ledger), Arc::clone(&violations));
    let router = intake
        .output_wire()
        .build_splitter("split")?
        .build_filter("notStale", move |event: &GossipEvent| {
            let fresh = event.round + 2 >= CURRENT_ROUND;
            if !fresh {
                // dropped events leave the pipeline here
                stale_violations.record(stale_ledger.event_exited(event.received_from));
            }
            fresh
        })?
        .build_transformer("classify", |event: GossipEvent| {
            let destination = if event.creator == SELF_ID {
                Destination::SelfEvents
            } else {
                Destination::PeerEvents
            };
            Some(RoutableData::new(destination, event))
        })?
        .build_router("router")?;

    let self_count = Arc::new(AtomicU64::new(0));
    let peer_count = Arc::new(AtomicU64::new(0));
    for (destination, count) in [
        (Destination::SelfEvents, Arc::clone(&self_count)),
        (Destination::PeerEvents, Arc::clone(&peer_count)),
    ] {
        let (exited, sink_violations) = (Arc::clone(&ledger), Arc::clone(&violations));
        router.output_wire(destination)?.solder_to_consumer(
            &format!("{destination:?}Sink"),
            move |event: GossipEvent| {
                count.fetch_add(1, Ordering::Relaxed);
                sink_violations.record(exited.event_exited(event.received_from));
            },
        )?;
    }

    if model.check_for_cyclical_backpressure() {
        return Err("wiring contains a backpressure cycle".into());
    }
    println!("{}", model.generate_wiring_diagram());

    let start = Instant::now();
    let peers: Vec<_> = (1..=4u64)
        .map(|peer| {
            let batches = batches.clone();
            thread::spawn(move || {
                for round in 0..=CURRENT_ROUND {
                    let batch = (0..=peer)
                        .map(|creator| GossipEvent {
                            creator: NodeId(creator),
                            round,
                            received_from: (creator != 0).then_some(NodeId(peer)),
                        })
                        .collect();
                    batches.put(batch)?;
                }
                Ok::<(), gossip_backbone::WiringError>(())
            })
        })
        .collect();
    for peer in peers {
        peer.join().map_err(|_| "peer thread panicked")??;
    }

    println!("Self events: {}", self_count.load(Ordering::Relaxed));
    println!("Peer events: {}", peer_count.load(Ordering::Relaxed));
    println!(
        "Peers with events still in intake: {}",
        ledger.peers_with_unprocessed()
    );
    println!("\n{}", model.metrics_summary());
    println!("Elapsed: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
    violations.check()?;
    Ok(())
}
