use std::hint::black_box;

use bytes::BytesMut;
use criterion::{Criterion, criterion_group, criterion_main};
use scpi_protocol::{
    BlockData, BlockDataType, SentinelFramer,
    block::{decode_block, encode_block},
};

fn trace() -> BlockData {
    BlockData::Int16((0..4096).map(|i| (i % 1000) as i16 - 500).collect())
}

fn bench_encode_block(c: &mut Criterion) {
    let data = trace();
    c.bench_function("encode_int16_block", |b| {
        b.iter(|| encode_block(black_box(&data)).unwrap())
    });
}

fn bench_decode_block(c: &mut Criterion) {
    let encoded = encode_block(&trace()).unwrap();
    c.bench_function("decode_int16_block", |b| {
        b.iter(|| decode_block("TRAC", black_box(&encoded), BlockDataType::Int16).unwrap())
    });
}

fn bench_frame_block(c: &mut Criterion) {
    let framer = SentinelFramer::default();
    let mut unit = BytesMut::new();
    framer.encode_unit(&encode_block(&trace()).unwrap(), &mut unit);
    c.bench_function("frame_block_unit", |b| {
        b.iter(|| {
            let mut buf = unit.clone();
            framer.split_unit(black_box(&mut buf)).unwrap()
        })
    });
}

fn bench_frame_text(c: &mut Criterion) {
    let framer = SentinelFramer::default();
    let unit = BytesMut::from(&b"orange;98.7;30;1;130;0.1 0.2 0.3 0.4\r\n"[..]);
    c.bench_function("frame_text_unit", |b| {
        b.iter(|| {
            let mut buf = unit.clone();
            framer.split_unit(black_box(&mut buf)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_block,
    bench_decode_block,
    bench_frame_block,
    bench_frame_text
);
criterion_main!(benches);
