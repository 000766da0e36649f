use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

async fn connect(host: &str, port: u16) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname(format!("bench_{}", Ulid::new()))
        .user("availd")
        .password("availd");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn date(offset_days: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap() + chrono::Duration::days(offset_days)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn in_list(units: &[Ulid]) -> String {
    units
        .iter()
        .map(|u| format!("'{u}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn phase1_sequential(host: &str, port: u16) {
    let client = connect(host, port).await;
    let uid = Ulid::new();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let d = date((i % 365) as i64);
        let status = if i % 3 == 0 { "booked" } else { "maintenance" };
        let t = Instant::now();
        client
            .batch_execute(&format!(
                "INSERT INTO availability (unit_id, date, status) VALUES ('{uid}', '{d}', '{status}')"
            ))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!(
        "  {n} cell upserts in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_bulk(host: &str, port: u16) {
    let n_tasks = 10;
    let n_per_task = 50;
    let units_per_edit = 20;
    let days_per_edit = 7;

    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_tasks {
        let host = host.to_string();
        handles.push(tokio::spawn(async move {
            // Each task uses its own tenant (unique dbname from connect())
            let client = connect(&host, port).await;
            let units: Vec<Ulid> = (0..units_per_edit).map(|_| Ulid::new()).collect();
            let ids = in_list(&units);

            for j in 0..n_per_task {
                let from = date((j * days_per_edit) as i64);
                let to = date((j * days_per_edit + days_per_edit - 1) as i64);
                client
                    .batch_execute(&format!(
                        "UPDATE availability SET status = 'booked' WHERE unit_id IN ({ids}) AND date BETWEEN '{from}' AND '{to}'"
                    ))
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total_cells = n_tasks * n_per_task * units_per_edit * days_per_edit;
    let ops = total_cells as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bulk edits ({units_per_edit}x{days_per_edit} cells) = {total_cells} cells in {:.2}s = {ops:.0} cells/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_read_under_load(host: &str, port: u16) {
    // Writer tasks: continuously bulk-edit in their own tenants
    let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for _ in 0..5 {
        let host = host.to_string();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let units: Vec<Ulid> = (0..10).map(|_| Ulid::new()).collect();
            let ids = in_list(&units);
            let mut i = 0i64;
            while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                let from = date(i % 300);
                let to = date(i % 300 + 6);
                let _ = client
                    .batch_execute(&format!(
                        "UPDATE availability SET status = 'maintenance' WHERE unit_id IN ({ids}) AND date BETWEEN '{from}' AND '{to}'"
                    ))
                    .await;
                i += 1;
            }
        }));
    }

    // Reader tasks: grid reads + aggregate counts, latency measured
    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();

    for _ in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let units: Vec<Ulid> = (0..25).map(|_| Ulid::new()).collect();
            let ids = in_list(&units);

            // seed a month of exceptions so reads are non-trivial
            client
                .batch_execute(&format!(
                    "UPDATE availability SET status = 'booked' WHERE unit_id IN ({ids}) AND date BETWEEN '{}' AND '{}'",
                    date(0),
                    date(29)
                ))
                .await
                .unwrap();

            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let t = Instant::now();
                if i % 2 == 0 {
                    client
                        .simple_query(&format!(
                            "SELECT * FROM availability WHERE unit_id IN ({ids}) AND date BETWEEN '{}' AND '{}'",
                            date(0),
                            date(13)
                        ))
                        .await
                        .unwrap();
                } else {
                    client
                        .simple_query(&format!(
                            "SELECT * FROM available_count WHERE date = '{}' AND unit_id IN ({ids})",
                            date((i % 30) as i64)
                        ))
                        .await
                        .unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("grid/aggregate query", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let uid = Ulid::new();

            for i in 0..ops_per_conn {
                let d = date(i as i64);
                client
                    .batch_execute(&format!(
                        "INSERT INTO availability (unit_id, date, status) VALUES ('{uid}', '{d}', 'reserved')"
                    ))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(std::sync::atomic::Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("AVAILD_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("AVAILD_PORT")
        .unwrap_or_else(|_| "5462".into())
        .parse()
        .expect("invalid AVAILD_PORT");

    println!("=== availd stress benchmark ===");
    println!("target: {host}:{port}\n");

    // Each phase uses its own tenant (unique dbname) to avoid interference

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] concurrent bulk-edit throughput");
    phase2_concurrent_bulk(&host, port).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&host, port).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}
