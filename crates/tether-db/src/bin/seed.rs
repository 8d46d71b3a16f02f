//! # Seed Data Generator
//!
//! Populates a local document database with sample profiles and stations.
//!
//! ## Usage
//! ```bash
//! # Generate 50 profiles (default)
//! cargo run -p tether-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p tether-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p tether-db --bin seed -- --db ./data/tether.db
//! ```
//!
//! ## Generated Documents
//! - `profiles/{uuid}`: username, first/last name, email, favorite stations
//! - `stations/{code}`: name, active flag, chef ids

use serde_json::{json, Value};
use std::env;
use tether_core::Fields;
use tether_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Ken", "Margaret", "Dennis", "Frances", "Donald",
];

const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Thompson", "Hamilton", "Ritchie",
    "Allen", "Knuth",
];

const STATIONS: &[(&str, &str)] = &[
    ("grill", "Grill"),
    ("fry", "Fryer"),
    ("pastry", "Pastry"),
    ("sauce", "Saucier"),
    ("pass", "Pass"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 50;
    let mut db_path = String::from("./tether_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tether Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of profiles to generate (default: 50)");
                println!("  -d, --db <PATH>    Database file path (default: ./tether_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, profiles = count, "Seeding local document store");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let docs = db.documents();

    let existing = docs.count("profiles").await?;
    if existing > 0 {
        warn!(existing, "Database already has profiles, skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();

    for (code, name) in STATIONS {
        docs.set("stations", code, station_fields(name), false).await?;
    }

    let mut generated = 0;
    for n in 0..count {
        let id = Uuid::new_v4().to_string();
        if let Err(e) = docs.set("profiles", &id, profile_fields(n), false).await {
            warn!(id = %id, error = %e, "Failed to insert profile");
            continue;
        }

        let station = STATIONS[n % STATIONS.len()].0;
        docs.patch_field(
            "stations",
            station,
            "chefs",
            tether_core::FieldOp::ArrayUnion(Value::String(id)),
        )
        .await?;

        generated += 1;
    }

    info!(
        profiles = generated,
        stations = STATIONS.len(),
        elapsed = ?start.elapsed(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}

fn station_fields(name: &str) -> Fields {
    match json!({ "name": name, "active": true, "chefs": [] }) {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

fn profile_fields(n: usize) -> Fields {
    let first = FIRST_NAMES[n % FIRST_NAMES.len()];
    let last = LAST_NAMES[(n / FIRST_NAMES.len()) % LAST_NAMES.len()];
    let username = format!("{}{}", first.to_lowercase(), n);
    let favorites: Vec<&str> = STATIONS
        .iter()
        .skip(n % STATIONS.len())
        .take(2)
        .map(|(code, _)| *code)
        .collect();

    match json!({
        "username": username,
        "first_name": first,
        "last_name": last,
        "email": format!("{username}@example.com"),
        "favorite_stations": favorites,
    }) {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
