use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use managed_thread::logging::{self, LogConfig};
use managed_thread::{ManagedThread, PeriodicTimer, ThreadConfig, WorkUnit, run_async};

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "managed-thread",
    version,
    about = "Exercise managed threads: timers, fan-out/join and repeating loops"
)]
struct Cli {
    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,
    /// JSON log lines with thread span events
    #[arg(long, global = true)]
    production_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a periodic timer and report how often it fired
    Timer {
        /// Timer interval
        #[arg(long, value_name = "MS", default_value_t = 50)]
        interval_ms: u64,
        /// How long to observe the timer
        #[arg(long, value_name = "MS", default_value_t = 500)]
        duration_ms: u64,
    },
    /// Run one action per delay concurrently and print the joined results
    Fanout {
        /// Comma-separated sleep per action, in milliseconds
        #[arg(long, value_delimiter = ',', default_values_t = [100, 0, 30])]
        delays: Vec<u64>,
    },
    /// Run a counting work loop configured from a TOML file
    Loop {
        /// Thread configuration file
        #[arg(long, value_name = "PATH", env = "MANAGED_THREAD_CONFIG")]
        config: Option<PathBuf>,
        /// How long to let the loop run before stopping it
        #[arg(long, value_name = "MS", default_value_t = 200)]
        duration_ms: u64,
        /// Max time to wait for the loop to exit after stopping
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        timeout_ms: u64,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_config = if cli.production_logs {
        LogConfig::production()
    } else {
        LogConfig::from_env()
    };
    logging::init(log_config.verbose(cli.verbose));

    let result = match cli.command {
        Commands::Timer {
            interval_ms,
            duration_ms,
        } => run_timer(interval_ms, duration_ms),
        Commands::Fanout { delays } => run_fanout(delays),
        Commands::Loop {
            config,
            duration_ms,
            timeout_ms,
            json,
        } => run_loop(config, duration_ms, timeout_ms, json),
    };

    managed_thread::stop_all(false);
    result
}

fn run_timer(interval_ms: u64, duration_ms: u64) -> Result<()> {
    let fired_at = Arc::new(std::sync::Mutex::new(Vec::new()));
    let started = Instant::now();
    let sink = Arc::clone(&fired_at);
    let timer = PeriodicTimer::start(Duration::from_millis(interval_ms), (), move |_, _| {
        if let Ok(mut times) = sink.lock() {
            times.push(started.elapsed().as_millis());
        }
    })?;

    std::thread::sleep(Duration::from_millis(duration_ms));
    timer.stop_and_wait();

    let times = fired_at.lock().map(|t| t.clone()).unwrap_or_default();
    println!(
        "timer fired {} times in {}ms (interval {}ms)",
        timer.fire_count(),
        duration_ms,
        interval_ms
    );
    println!("fired at (ms): {:?}", times);
    Ok(())
}

fn run_fanout(delays: Vec<u64>) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let actions: Vec<_> = delays
        .iter()
        .copied()
        .enumerate()
        .map(|(index, delay)| {
            move || {
                std::thread::sleep(Duration::from_millis(delay));
                (index, delay)
            }
        })
        .collect();

    run_async(actions, move |results| {
        let _ = tx.send(results);
    })?;

    let results = rx
        .recv_timeout(Duration::from_secs(60))
        .context("fan-out did not complete")?;
    println!("joined {} results in {}ms", results.len(), started.elapsed().as_millis());
    for result in results {
        match result {
            Ok((index, delay)) => println!("  [{index}] slept {delay}ms"),
            Err(err) => println!("  error: {err}"),
        }
    }
    Ok(())
}

fn run_loop(config: Option<PathBuf>, duration_ms: u64, timeout_ms: u64, json: bool) -> Result<()> {
    let config = match config {
        Some(path) => ThreadConfig::load(&path)?,
        None => ThreadConfig::default(),
    };
    let mode = config.mode()?;
    let iterations = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&iterations);
    let work = WorkUnit::new(
        move |sender: &ManagedThread, _: &()| {
            let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
            sender.set_tag("iterations", count as i64);
        },
        mode,
        (),
    );

    let thread = ManagedThread::with_options(config.options());
    thread.start_with_exit(work, |sender, _| {
        tracing::info!(thread_id = %sender.id(), "Loop finished");
    })?;

    std::thread::sleep(Duration::from_millis(duration_ms));
    if !thread.stop_timeout(Duration::from_millis(timeout_ms)) {
        bail!("thread {} did not exit within {}ms", thread.id(), timeout_ms);
    }

    let iterations = iterations.load(Ordering::SeqCst);
    if json {
        let report = serde_json::json!({
            "thread_id": thread.id(),
            "status": thread.status(),
            "iterations": iterations,
            "tags": thread.tags(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "thread {} {} after {} iterations",
            thread.id(),
            thread.status(),
            iterations
        );
    }
    Ok(())
}
