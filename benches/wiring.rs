use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gossip_backbone::wiring::WiringModel;
use gossip_backbone::Cancellation;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn benchmark_three_stage_chain(c: &mut Criterion) {
    let model = WiringModel::new();
    let first = model
        .scheduler_builder("first")
        .expect("Name rejected")
        .build::<u64>()
        .expect("Build failed");
    let input = first.build_input_wire::<u64>("in").expect("Wire failed");
    input.bind(Some).expect("Bind failed");

    let total = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&total);
    first
        .output_wire()
        .build_transformer("double", |x: u64| Some(x * 2))
        .expect("Build failed")
        .build_filter("nonzero", |x| *x != 0)
        .expect("Build failed")
        .solder_to_consumer("sum", move |x| {
            sink.fetch_add(x, Ordering::Relaxed);
        })
        .expect("Solder failed");

    c.bench_function("three_stage_chain_1000_msgs", |b| {
        b.iter(|| {
            for i in 0..1000 {
                input.put(black_box(i)).expect("Put failed");
            }
        });
    });
}

fn benchmark_bounded_contention(c: &mut Criterion) {
    let model = WiringModel::new();
    let scheduler = model
        .scheduler_builder("bounded")
        .expect("Name rejected")
        .with_unhandled_task_capacity(2)
        .build::<()>()
        .expect("Build failed");
    let input = scheduler.build_input_wire::<u64>("in").expect("Wire failed");
    input
        .bind_consumer(|x| {
            black_box(x);
            thread::sleep(Duration::from_micros(10));
        })
        .expect("Bind failed");

    c.bench_function("bounded_capacity_2_four_producers_400_msgs", |b| {
        b.iter(|| {
            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let input = input.clone();
                    thread::spawn(move || {
                        for i in 0..100 {
                            input.put(i).expect("Put failed");
                        }
                    })
                })
                .collect();
            for producer in producers {
                producer.join().expect("Producer panicked");
            }
            scheduler.flush(&Cancellation::never()).expect("Flush failed");
        });
    });
}

fn benchmark_list_splitter(c: &mut Criterion) {
    let model = WiringModel::new();
    let batches = model
        .scheduler_builder("batches")
        .expect("Name rejected")
        .build::<Vec<u64>>()
        .expect("Build failed");
    let input = batches.build_input_wire::<Vec<u64>>("in").expect("Wire failed");
    input.bind(Some).expect("Bind failed");
    batches
        .output_wire()
        .build_splitter("split")
        .expect("Build failed")
        .solder_to_consumer("drain", |x| {
            black_box(x);
        })
        .expect("Solder failed");

    c.bench_function("split_100_batches_of_64", |b| {
        b.iter(|| {
            for _ in 0..100 {
                input.put(vec![7; 64]).expect("Put failed");
            }
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_three_stage_chain, benchmark_bounded_contention, benchmark_list_splitter
);
criterion_main!(benches);
