use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gossip_backbone::sync::SyncRole;
use gossip_backbone::{NodeId, PeerBackpressureLedger, RoleLock, SyncPermitGate};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn benchmark_permit_churn(c: &mut Criterion) {
    let gate = Arc::new(SyncPermitGate::new(17));
    c.bench_function("permit_acquire_release_4_threads", |b| {
        b.iter(|| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let gate = Arc::clone(&gate);
                    thread::spawn(move || {
                        for _ in 0..1000 {
                            if gate.try_acquire() {
                                gate.release().expect("Release failed");
                            }
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().expect("Worker panicked");
            }
        });
    });
}

fn benchmark_role_lock(c: &mut Criterion) {
    let lock = RoleLock::unobserved();
    c.bench_function("role_lock_uncontended", |b| {
        b.iter(|| {
            let guard = lock.try_acquire(black_box(SyncRole::Outbound));
            black_box(guard.is_locked());
        });
    });
}

fn benchmark_ledger(c: &mut Criterion) {
    let ledger = PeerBackpressureLedger::new();
    ledger.pre_register((0..64).map(NodeId));
    c.bench_function("ledger_enter_exit_64_peers", |b| {
        b.iter(|| {
            for peer in 0..64 {
                ledger.event_entered(Some(NodeId(peer)));
            }
            for peer in 0..64 {
                ledger
                    .event_exited(Some(NodeId(black_box(peer))))
                    .expect("Underflow");
            }
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(50);
    targets = benchmark_permit_churn, benchmark_role_lock, benchmark_ledger
);
criterion_main!(benches);
