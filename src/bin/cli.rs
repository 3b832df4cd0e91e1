//! LKVS CLI
//!
//! Command-line tools for formatting, filling and inspecting an LKVS device.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args as ClapArgs, Parser, Subcommand};
use lkvs::{AllocationPolicy, Config, Engine, LkvsError, OpenFlags, Result, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// LKVS CLI
#[derive(Parser, Debug)]
#[command(name = "lkvs-cli")]
#[command(about = "Linear key/value store on a block device or file")]
#[command(version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct StoreArgs {
    /// Allocation block size in bytes
    #[arg(long, default_value = "4096", global = true)]
    block_size: u32,

    /// Size in MB given to a new device file
    #[arg(long, default_value = "64", global = true)]
    device_mb: u64,

    /// Use best-fit instead of first-fit placement
    #[arg(long, global = true)]
    best_fit: bool,

    /// Persist metadata only when the store is closed
    #[arg(long, global = true)]
    sync_on_close: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty store on the device, discarding its contents
    Format {
        /// Device or file path
        device: PathBuf,
    },

    /// Store a value
    Put {
        device: PathBuf,
        key: String,
        value: String,
    },

    /// Store a file's contents under its file name
    Fileput {
        device: PathBuf,
        /// File to store
        file: PathBuf,
    },

    /// Write a value to stdout
    Get {
        device: PathBuf,
        key: String,

        /// Buffer size (defaults to the stored length)
        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Remove a key
    Delete { device: PathBuf, key: String },

    /// Format the device and put `count` values of `size` bytes (keys "0".."count")
    Multiput {
        device: PathBuf,
        count: usize,
        size: usize,

        /// Worker threads
        #[arg(short, long, default_value = "1")]
        threads: usize,
    },

    /// Get and verify the values written by `multiput`
    Multiget {
        device: PathBuf,
        count: usize,
        size: usize,

        /// Worker threads
        #[arg(short, long, default_value = "1")]
        threads: usize,
    },

    /// List all keys
    Keys { device: PathBuf },

    /// Show space accounting
    Stats { device: PathBuf },
}

fn main() {
    // Initialize tracing/logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,lkvs=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = build_config(&args.store);

    if let Err(e) = run(config, args.command) {
        tracing::error!("{}", e);
        std::process::exit(e.status_code().abs());
    }
}

fn build_config(store: &StoreArgs) -> Config {
    Config::builder()
        .block_size(store.block_size)
        .device_size(store.device_mb * 1024 * 1024)
        .allocation_policy(if store.best_fit {
            AllocationPolicy::BestFit
        } else {
            AllocationPolicy::FirstFit
        })
        .sync_strategy(if store.sync_on_close {
            SyncStrategy::OnClose
        } else {
            SyncStrategy::EveryWrite
        })
        .build()
}

fn run(config: Config, command: Commands) -> Result<()> {
    match command {
        Commands::Format { device } => {
            let engine = open(config, &device, OpenFlags::FORMAT | OpenFlags::CREATE)?;
            let stats = engine.stats()?;
            println!("Formatted {} ({} bytes usable)", device.display(), stats.capacity);
            engine.destroy();
        }

        Commands::Put { device, key, value } => {
            let engine = open(config, &device, OpenFlags::RW | OpenFlags::CREATE)?;
            engine.put(&key, value.as_bytes())?;
            engine.destroy();
        }

        Commands::Fileput { device, file } => {
            let data = fs::read(&file)?;
            let key = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    LkvsError::InvalidArgument(format!("{} has no file name", file.display()))
                })?;

            let engine = open(config, &device, OpenFlags::RW | OpenFlags::CREATE)?;
            let start = Instant::now();
            engine.put(&key, &data)?;
            println!("Put {} ({} bytes) in {} us", key, data.len(), start.elapsed().as_micros());
            engine.destroy();
        }

        Commands::Get { device, key, size } => {
            let engine = open(config, &device, OpenFlags::READ)?;
            let size = match size {
                Some(size) => size,
                None => engine.value_len(&key)?,
            };
            let mut buf = vec![0u8; size];
            let len = engine.get(&key, &mut buf)?;
            io::stdout().write_all(&buf[..len])?;
            engine.destroy();
        }

        Commands::Delete { device, key } => {
            let engine = open(config, &device, OpenFlags::RW)?;
            engine.delete(&key)?;
            engine.destroy();
        }

        Commands::Multiput {
            device,
            count,
            size,
            threads,
        } => {
            let engine = open(config, &device, OpenFlags::FORMAT | OpenFlags::CREATE)?;
            let start = Instant::now();
            for_each_key(count, threads, |i| {
                let value = vec![i as u8; size];
                engine.put(&i.to_string(), &value)
            })?;
            report("Put", count, start);
            engine.destroy();
        }

        Commands::Multiget {
            device,
            count,
            size,
            threads,
        } => {
            let engine = open(config, &device, OpenFlags::READ)?;
            let start = Instant::now();
            for_each_key(count, threads, |i| {
                let mut buf = vec![0u8; size];
                let len = engine.get(&i.to_string(), &mut buf)?;
                if buf[..len].iter().any(|&b| b != i as u8) {
                    eprintln!("Key: {} data mismatch", i);
                }
                Ok(())
            })?;
            report("Get", count, start);
            engine.destroy();
        }

        Commands::Keys { device } => {
            let engine = open(config, &device, OpenFlags::READ)?;
            for key in engine.keys()? {
                println!("{}", key);
            }
            engine.destroy();
        }

        Commands::Stats { device } => {
            let engine = open(config, &device, OpenFlags::READ)?;
            let stats = engine.stats()?;
            println!("device size:   {}", stats.device_size);
            println!("capacity:      {}", stats.capacity);
            println!("used bytes:    {}", stats.used_bytes);
            println!("free bytes:    {}", stats.free_bytes);
            println!("live bytes:    {}", stats.live_bytes);
            println!("keys:          {}", stats.keys);
            println!("largest free:  {}", stats.largest_free);
            println!("free extents:  {}", stats.free_extents);
            println!("generation:    {}", stats.generation);
            engine.destroy();
        }
    }

    Ok(())
}

fn open(config: Config, device: &Path, flags: OpenFlags) -> Result<Engine> {
    let engine = Engine::with_config(config);
    engine.open(device, flags)?;
    Ok(engine)
}

/// Run `op` for keys `0..count`, split across `threads` workers
fn for_each_key<F>(count: usize, threads: usize, op: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Sync,
{
    let threads = threads.max(1);
    let op = &op;

    crossbeam::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                scope.spawn(move |_| -> Result<()> {
                    for i in (worker..count).step_by(threads) {
                        op(i)?;
                    }
                    Ok(())
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .unwrap_or_else(|_| Err(LkvsError::InvalidState("worker panicked".to_string())))
            })
            .collect::<Result<Vec<()>>>()
    })
    .map_err(|_| LkvsError::InvalidState("worker panicked".to_string()))??;

    Ok(())
}

fn report(op: &str, count: usize, start: Instant) {
    let elapsed = start.elapsed().as_micros();
    println!("{} ops took: {} us.", op, elapsed);
    if count > 0 {
        println!("Average op time: {} us.", elapsed / count as u128);
    }
}
