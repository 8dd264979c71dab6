//! Simulated gossip sync sessions between this node and its peers
//!
//! Each peer thread repeatedly tries to start a sync. A session needs a permit
//! from the shared gate and the peer's role lock; the outbound and inbound
//! sides race for the same lock. A snapshot consumer borrows the node's event
//! buffer through a handoff once every round finishes.
//!
//! Usage: cargo run --example sync_sessions --release

use gossip_backbone::sync::SyncRole;
use gossip_backbone::{
    BackboneConfig, Cancellation, Handoff, MonotonicWaitCounter, RoleLock, SyncPermitGate,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const PEERS: usize = 6;
const ROUNDS: u64 = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gossip_backbone=info,sync_sessions=info")),
        )
        .init();

    let config: BackboneConfig = toml::from_str("sync_permits = 3")?;
    config.validate()?;
    let gate = Arc::new(SyncPermitGate::new(config.sync_permits));
    let locks: Arc<Vec<RoleLock>> = Arc::new(
        (0..PEERS)
            .map(|peer| {
                RoleLock::new(
                    move |role| info!(peer, %role, "sync started"),
                    move |role| info!(peer, %role, "sync finished"),
                )
            })
            .collect(),
    );
    let rounds = Arc::new(MonotonicWaitCounter::new());
    let buffer = Arc::new(Handoff::<Vec<u64>>::new());
    let completed = Arc::new(AtomicU64::new(0));
    let refused = Arc::new(AtomicU64::new(0));

    let snapshotter = {
        let (rounds, buffer) = (Arc::clone(&rounds), Arc::clone(&buffer));
        thread::spawn(move || -> gossip_backbone::Result<()> {
            let cancel = Cancellation::never();
            for round in 1..=ROUNDS {
                rounds.await_value(round, &cancel)?;
                let events = buffer.wait_for_resource(&cancel)?;
                info!(round, events = events.len(), "snapshot taken");
            }
            Ok(())
        })
    };

    let mut events = Vec::new();
    for round in 1..=ROUNDS {
        let sessions: Vec<_> = (0..PEERS * 2)
            .map(|attempt| {
                let (gate, locks) = (Arc::clone(&gate), Arc::clone(&locks));
                let (completed, refused) = (Arc::clone(&completed), Arc::clone(&refused));
                thread::spawn(move || -> gossip_backbone::Result<()> {
                    let peer = attempt % PEERS;
                    let role = if attempt < PEERS {
                        SyncRole::Outbound
                    } else {
                        SyncRole::Inbound
                    };
                    if !gate.try_acquire() {
                        refused.fetch_add(1, Ordering::Relaxed);
                        return Ok(());
                    }
                    if let Some(_guard) = locks[peer].try_acquire(role).into_guard() {
                        thread::sleep(Duration::from_millis(2));
                        completed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        refused.fetch_add(1, Ordering::Relaxed);
                    }
                    gate.release()
                })
            })
            .collect();
        for session in sessions {
            session.join().map_err(|_| "session panicked")??;
        }
        gate.wait_until_all_released(&Cancellation::never())?;

        events.push(round);
        rounds.set(round)?;
        while !buffer.acquire_provide_permit() {
            thread::sleep(Duration::from_millis(1));
        }
        events = buffer.provide(events, &Cancellation::never())?;
    }
    snapshotter.join().map_err(|_| "snapshotter panicked")??;

    println!("Sessions completed: {}", completed.load(Ordering::Relaxed));
    println!("Sessions refused: {}", refused.load(Ordering::Relaxed));
    println!("Rounds snapshotted: {}", events.len());
    Ok(())
}
