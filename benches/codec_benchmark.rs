use alpinebits_bridge::capabilities::{intersect, server_capabilities};
use alpinebits_bridge::ingestion::{validate, Ingestion};
use alpinebits_bridge::model::{GuestRequest, Hotel, Submission};
use alpinebits_bridge::store::MemoryStore;
use alpinebits_bridge::xml_codec::{parse_ping, write_read_response, SAMPLE_PING_REQUEST_PATH};
use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn backlog(count: usize) -> Vec<GuestRequest> {
    let ingestion = Ingestion::new(Arc::new(MemoryStore::new()), "de");
    let submission = Submission {
        email: Some("anna@example.com".into()),
        first_name: Some("Anna".into()),
        last_name: Some("Huber".into()),
        phone: Some("0664 1234567".into()),
        adults: Some(2.into()),
        children: Some(2.into()),
        child_age1: Some(4.into()),
        child_age2: Some(9.into()),
        period: Some("2025-06-01 - 2025-06-05".into()),
        selected_room: Some("DBL|Double Room".into()),
        comments: Some("Late arrival & quiet room please".into()),
        ..Default::default()
    };
    let now = Utc::now();

    (0..count)
        .map(|i| {
            let valid = validate(&submission).unwrap();
            ingestion.build_request(
                "h1",
                &submission,
                valid,
                format!("GR_{:010}_h1_bench", i),
                now - Duration::seconds(i as i64),
            )
        })
        .collect()
}

pub fn read_response_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_response");
    let hotel = Hotel::new("h1", "Hotel One");

    for size in [1, 50, 500].iter() {
        let requests = backlog(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &requests, |b, requests| {
            b.iter(|| write_read_response(black_box(requests), &hotel).unwrap())
        });
    }

    group.finish();
}

pub fn handshake_benchmark(c: &mut Criterion) {
    let xml = std::fs::read_to_string(SAMPLE_PING_REQUEST_PATH).unwrap();
    let server = server_capabilities();

    c.bench_function("parse_ping", |b| b.iter(|| parse_ping(black_box(&xml)).unwrap()));

    let ping = parse_ping(&xml).unwrap();
    c.bench_function("intersect", |b| {
        b.iter(|| intersect(black_box(&ping.capabilities), &server))
    });
}

criterion_group!(benches, read_response_benchmark, handshake_benchmark);
criterion_main!(benches);
