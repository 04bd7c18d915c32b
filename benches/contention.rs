use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ulid::Ulid;

use reservo::catalog::InMemoryCatalog;
use reservo::config::EngineConfig;
use reservo::engine::Engine;
use reservo::model::*;

const HOUR: i64 = 3_600_000; // 1 hour in ms

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn now_ms() -> Ms {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

struct Bench {
    engine: Arc<Engine>,
    catalog: Arc<InMemoryCatalog>,
    store_id: Ulid,
    /// Next whole hour from now; every booking lands after it.
    base: Ms,
}

impl Bench {
    fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let store_id = Ulid::new();
        catalog.set_booking_enabled(store_id, true);
        let config = EngineConfig {
            max_advance_days: 3650,
            ..Default::default()
        };
        let engine = Engine::in_memory(config, catalog.clone()).expect("valid config");
        let base = (now_ms() / HOUR + 1) * HOUR;
        Self {
            engine: Arc::new(engine),
            catalog,
            store_id,
            base,
        }
    }

    fn service(&self, capacity: u32) -> Ulid {
        let id = Ulid::new();
        self.catalog.upsert_service(Service {
            id,
            store_id: self.store_id,
            name: format!("bench-{capacity}"),
            description: String::new(),
            duration_minutes: Some(60),
            buffer_before_minutes: Some(0),
            buffer_after_minutes: Some(0),
            capacity: Some(capacity),
            is_active: true,
        });
        id
    }

    fn request(&self, service_id: Ulid, hour: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            store_id: self.store_id,
            service_id,
            start_at: self.base + hour * HOUR,
            end_at: None,
            user_name: "bench".into(),
            user_contact: String::new(),
            note: None,
        }
    }
}

async fn phase1_sequential(bench: &Bench) {
    let service_id = bench.service(1);
    let n = 5000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        bench
            .engine
            .create_booking(bench.request(service_id, i as i64), Ulid::new())
            .await
            .expect("non-overlapping booking");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("create latency", &mut latencies);
}

/// Many tasks racing for the same hour on a handful of services.
async fn phase2_contended(bench: &Bench) {
    let services: Vec<(Ulid, u32)> = [1, 1, 5, 5, 10]
        .into_iter()
        .map(|cap| (bench.service(cap), cap))
        .collect();
    let n_tasks = 50;
    let n_per_task = 40;

    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let engine = bench.engine.clone();
        let (service_id, _) = services[i % services.len()];
        let requests: Vec<_> = (0..n_per_task)
            .map(|j| bench.request(service_id, j as i64))
            .collect();
        handles.push(tokio::spawn(async move {
            let mut admitted = 0usize;
            for req in requests {
                if engine.create_booking(req, Ulid::new()).await.is_ok() {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    let mut admitted = 0;
    for h in handles {
        admitted += h.await.unwrap_or(0);
    }
    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let expected: usize = services.iter().map(|(_, cap)| *cap as usize * n_per_task).sum();
    println!(
        "  {n_tasks} tasks x {n_per_task} attempts = {total} in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    println!("  admitted {admitted} (capacity allows {expected})");
    assert!(admitted <= expected, "overbooked under contention");
}

async fn phase3_read_under_load(bench: &Bench) {
    let service_id = bench.service(10);
    for i in 0..200 {
        let _ = bench
            .engine
            .create_booking(bench.request(service_id, i), Ulid::new())
            .await;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..4 {
        let engine = bench.engine.clone();
        let stop = stop.clone();
        let req = bench.request(service_id, 0);
        writers.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let mut req = req.clone();
                req.start_at += (200 + w * 10_000 + i) * HOUR;
                let _ = engine.create_booking(req, Ulid::new()).await;
                i += 1;
            }
        }));
    }

    let n_readers = 8;
    let reads_per_reader = 300;
    let mut readers = Vec::new();
    for _ in 0..n_readers {
        let engine = bench.engine.clone();
        let (store_id, from) = (bench.store_id, bench.base);
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                let _ = engine
                    .get_calendar_availability(store_id, service_id, from, from + 7 * 24 * HOUR, None)
                    .await;
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap_or_default());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("availability query (7 days)", &mut all);
}

#[tokio::main]
async fn main() {
    println!("=== reservo contention benchmark ===\n");

    let bench = Bench::new();

    println!("[phase 1] sequential create throughput");
    phase1_sequential(&bench).await;

    println!("\n[phase 2] contended creates");
    phase2_contended(&bench).await;

    println!("\n[phase 3] availability latency under write load");
    phase3_read_under_load(&bench).await;

    println!("\n=== done ===");
}
