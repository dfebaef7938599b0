use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ipc_core::data_pipe::DataPipe;
use ipc_core::dispatcher::{ReadDataFlags, WriteDataFlags};

fn single_phase_round_trip(c: &mut Criterion) {
    let chunk = vec![7u8; 4096];
    c.bench_function("data_pipe_single_phase_write_read_4k", |b| {
        let (producer, consumer) = DataPipe::create(1, 64 * 1024).into_dispatchers();
        let mut sink = vec![0u8; 4096];
        b.iter(|| {
            producer.write_data(black_box(&chunk), WriteDataFlags::NONE).unwrap();
            consumer.read_data(black_box(&mut sink), ReadDataFlags::NONE).unwrap();
        });
    });
}

fn two_phase_round_trip(c: &mut Criterion) {
    c.bench_function("data_pipe_two_phase_write_read_4k", |b| {
        let (producer, consumer) = DataPipe::create(1, 64 * 1024).into_dispatchers();
        b.iter(|| {
            let mut mapping = producer.begin_write_data(4096).unwrap();
            for byte in mapping.as_mut_slice() {
                *byte = 7;
            }
            let written = mapping.len();
            drop(mapping);
            producer.end_write_data(written).unwrap();

            let mapping = consumer.begin_read_data(0).unwrap();
            let read = mapping.len();
            black_box(mapping.as_slice());
            drop(mapping);
            consumer.end_read_data(read).unwrap();
        });
    });
}

criterion_group!(benches, single_phase_round_trip, two_phase_round_trip);
criterion_main!(benches);
