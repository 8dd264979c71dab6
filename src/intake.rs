//! Per-peer accounting of events still moving through the intake pipeline.
//!
//! Gossip receipt records an event when it is handed to the pipeline and
//! again when its processing is over, whatever the outcome. Before accepting
//! more from a peer it asks whether that peer still has work in flight.
//! Locally created events carry no peer and are not tracked.

use crate::error::{Result, WiringError};
use crate::node_id::NodeId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Unprocessed event counts keyed by the peer that sent each event.
///
/// Each peer has its own atomic counter; the map shards only serialize the
/// first insertion of a peer. Entries are never removed individually, only
/// zeroed by [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct PeerBackpressureLedger {
    counts: DashMap<NodeId, AtomicU64>,
}

impl PeerBackpressureLedger {
    /// An empty ledger; peers are added on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Create zeroed entries for a known peer set up front
    pub fn pre_register(&self, peers: impl IntoIterator<Item = NodeId>) {
        for peer in peers {
            self.counts.entry(peer).or_insert_with(|| AtomicU64::new(0));
        }
    }

    /// An event from `peer` entered the pipeline
    pub fn event_entered(&self, peer: Option<NodeId>) {
        let Some(peer) = peer else {
            return;
        };
        if let Some(count) = self.counts.get(&peer) {
            count.fetch_add(1, Ordering::AcqRel);
            return;
        }
        self.counts
            .entry(peer)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::AcqRel);
    }

    /// An event from `peer` finished processing.
    ///
    /// Exiting more events than entered is a bookkeeping bug upstream and is
    /// reported, never clamped.
    pub fn event_exited(&self, peer: Option<NodeId>) -> Result<()> {
        let Some(peer) = peer else {
            return Ok(());
        };
        let decremented = self.counts.get(&peer).is_some_and(|count| {
            count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
                .is_ok()
        });
        if decremented {
            Ok(())
        } else {
            error!(%peer, "event exited intake with no unprocessed events recorded");
            Err(WiringError::LedgerUnderflow {
                peer: peer.to_string(),
            })
        }
    }

    /// True if `peer` has events still in the pipeline
    pub fn has_unprocessed(&self, peer: NodeId) -> bool {
        self.unprocessed(peer) > 0
    }

    pub fn unprocessed(&self, peer: NodeId) -> u64 {
        self.counts
            .get(&peer)
            .map_or(0, |count| count.load(Ordering::Acquire))
    }

    /// Number of peers that currently have events in flight
    pub fn peers_with_unprocessed(&self) -> usize {
        self.counts
            .iter()
            .filter(|entry| entry.value().load(Ordering::Acquire) > 0)
            .count()
    }

    /// Zero every counter, e.g. after the pipeline is cleared on reconnect
    pub fn reset(&self) {
        for entry in self.counts.iter() {
            entry.value().store(0, Ordering::Release);
        }
        debug!(peers = self.counts.len(), "intake ledger reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_enter_exit() {
        let ledger = PeerBackpressureLedger::new();
        let peer = NodeId(3);
        for _ in 0..3 {
            ledger.event_entered(Some(peer));
        }
        assert!(ledger.has_unprocessed(peer));
        for _ in 0..3 {
            ledger.event_exited(Some(peer)).unwrap();
        }
        assert!(!ledger.has_unprocessed(peer));
        assert_eq!(
            ledger.event_exited(Some(peer)),
            Err(WiringError::LedgerUnderflow {
                peer: "node3".into()
            })
        );
        assert_eq!(ledger.unprocessed(peer), 0);
    }

    #[test]
    fn test_exit_for_unknown_peer_rejected() {
        let ledger = PeerBackpressureLedger::new();
        assert!(ledger.event_exited(Some(NodeId(9))).is_err());
    }

    #[test]
    fn test_local_events_ignored() {
        let ledger = PeerBackpressureLedger::new();
        ledger.event_entered(None);
        assert!(ledger.event_exited(None).is_ok());
        assert!(ledger.event_exited(None).is_ok());
        assert_eq!(ledger.peers_with_unprocessed(), 0);
    }

    #[test]
    fn test_peers_are_independent() {
        let ledger = PeerBackpressureLedger::new();
        ledger.event_entered(Some(NodeId(1)));
        ledger.event_entered(Some(NodeId(2)));
        ledger.event_exited(Some(NodeId(1))).unwrap();
        assert!(!ledger.has_unprocessed(NodeId(1)));
        assert!(ledger.has_unprocessed(NodeId(2)));
        assert_eq!(ledger.peers_with_unprocessed(), 1);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let ledger = PeerBackpressureLedger::new();
        ledger.pre_register([NodeId(1), NodeId(2)]);
        ledger.event_entered(Some(NodeId(1)));
        ledger.event_entered(Some(NodeId(2)));
        ledger.reset();
        assert_eq!(ledger.peers_with_unprocessed(), 0);
        assert!(ledger.event_exited(Some(NodeId(1))).is_err());
    }
}
