///! # CLI - DriftKV Interactive Shell
///!
///! A REPL-style command-line interface for the DriftKV storage engine.
///! Reads commands from stdin, executes them against the engine, and prints
///! results to stdout. Designed for both interactive use and scripted
///! testing (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! PUT key value      Insert or update a key-value pair
///! GET key            Look up a key (prints value or "(nil)")
///! DEL key            Delete a key (writes a tombstone)
///! FLUSH              Seal the memtable and wait for its run to land
///! COMPACT            Run one compaction cycle synchronously
///! STATS              Print engine debug info
///! EXIT / QUIT        Shut down gracefully
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! DRIFTKV_DATA_DIR     Data directory              (default: "driftkv_data")
///! DRIFTKV_MEMTABLE_KB  Memtable seal threshold KiB (default: 1024 = 1 MiB)
///! DRIFTKV_WAL_SYNC     fsync every WAL append      (default: "true")
///! DRIFTKV_COMPACT_MIN  Min runs per size bucket    (default: 4)
///! RUST_LOG             tracing filter              (default: "info")
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! DriftKV started (seq=0, data_dir=driftkv_data, memtable=1024KiB)
///! > PUT name Alice
///! OK
///! > GET name
///! Alice
///! > EXIT
///! bye
///! ```

use anyhow::Result;
use engine::{Config, Engine};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to
/// `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let data_dir = env_or("DRIFTKV_DATA_DIR", "driftkv_data");
    let memtable_kb: usize = env_or("DRIFTKV_MEMTABLE_KB", "1024").parse().unwrap_or(1024);
    let wal_sync: bool = env_or("DRIFTKV_WAL_SYNC", "true").parse().unwrap_or(true);
    let compact_min: usize = env_or("DRIFTKV_COMPACT_MIN", "4").parse().unwrap_or(4);

    let mut cfg = Config::new(&data_dir);
    cfg.memtable_max_bytes = memtable_kb * 1024;
    cfg.compaction_min_threshold = compact_min;
    if !wal_sync {
        cfg.wal_sync_policy = engine::SyncPolicy::EveryN(64);
    }

    let engine = Engine::open(cfg)?;

    println!(
        "DriftKV started (seq={}, data_dir={}, memtable={}KiB)",
        engine.seq(),
        data_dir,
        memtable_kb
    );
    println!("Commands: PUT key value | GET key | DEL key");
    println!("          FLUSH | COMPACT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" | "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match engine.put(k.as_bytes().to_vec(), v.into_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.delete(k.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "FLUSH" => match engine.force_flush() {
                    Ok(()) => println!("OK (runs={})", engine.run_count()),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "COMPACT" => match engine.compact_now() {
                    Ok(true) => println!("OK (runs={})", engine.run_count()),
                    Ok(false) => println!("OK nothing to compact (runs={})", engine.run_count()),
                    Err(e) => println!("ERR compact failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", engine);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}
