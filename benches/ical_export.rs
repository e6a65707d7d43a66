//! Full calendar export benchmarks.
//!
//! Run with: `cargo bench --bench ical_export`

use chrono::{Duration, NaiveDate, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sam_events::calendar::ical::full_export;
use sam_events::models::{Event, EventStatus};
use uuid::Uuid;

fn sample_events(count: usize) -> Vec<Event> {
    let user_id = Uuid::new_v4();
    let first = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default();
    let now = Utc::now();

    (0..count)
        .map(|i| Event {
            id: Uuid::new_v4(),
            user_id,
            title: format!("Spectacle {}", i),
            venue_name: "La Taverne de Chambly".into(),
            description: (i % 2 == 0).then(|| "Humour et musique country".to_string()),
            date: first + Duration::days(i as i64),
            venue: "La Taverne de Chambly, 1737 Av. Bourgogne, Chambly, QC J3L 1Y8".into(),
            city: "Chambly".into(),
            tickets_url: None,
            add_to_calendar: true,
            publish_to_website: true,
            send_notification: false,
            status: EventStatus::Published,
            calendar_event_id: None,
            microsoft_event_id: None,
            apple_event_id: None,
            created_at: now,
            updated_at: now,
        })
        .collect()
}

fn bench_full_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_export");

    for size in [10, 100, 1000] {
        let events = sample_events(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| full_export(black_box(events)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_export);
criterion_main!(benches);
