//! CRC32C 및 재조립 벤치마크
//!
//! Run with: `cargo bench --bench crc32c`

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use udp_put::{crc32c, split_into_packets, File, Packet, MAX_PAYLOAD_SIZE};

/// 연속 버퍼 CRC32C
fn bench_crc32c(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32c");

    for size in [64, MAX_PAYLOAD_SIZE, 64 * 1024] {
        let data = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(crc32c(black_box(data))));
        });
    }

    group.finish();
}

/// 세그먼트 조립 후 파일 체크섬
fn bench_file_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_checksum");
    let size = 1024 * 1024;
    let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
    let packets = split_into_packets(1, &data, MAX_PAYLOAD_SIZE).unwrap();

    let mut file = File::new(1, packets.len() as u32);
    for packet in packets.iter().cloned() {
        file.add_packet(packet);
    }

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("1MiB", |b| b.iter(|| black_box(file.checksum())));
    group.finish();
}

/// 패킷 파싱
fn bench_packet_parse(c: &mut Criterion) {
    let datagram = Packet::put(7, 3, 10, Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE])).to_bytes();

    c.bench_function("packet_parse", |b| {
        b.iter(|| black_box(Packet::from_bytes(black_box(&datagram)).unwrap()));
    });
}

criterion_group!(benches, bench_crc32c, bench_file_checksum, bench_packet_parse);
criterion_main!(benches);
