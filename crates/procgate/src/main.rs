use std::error::Error;
use std::process;

use clap::{Parser, Subcommand};
use procgate_utils::{init_logging, init_logging_with_level, LogFormat, LogLevel};

#[cfg(target_os = "linux")]
mod client;
mod hex;

/// Cross-process memory transfer and input injection, driven through the
/// service's command interface.
#[derive(Parser, Debug)]
#[command(name = "procgate")]
#[command(version)]
#[command(about = "Cross-process memory transfer and input injection", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Read memory from a process
    Read
    {
        /// Target process ID
        pid: i32,
        /// Address to read from (hex format: 0x1000 or decimal)
        #[arg(value_parser = hex::parse_address)]
        address: u64,
        /// Number of bytes to read
        #[arg(default_value_t = 16)]
        size: u64,
    },
    /// Write bytes into a process
    Write
    {
        /// Target process ID
        pid: i32,
        /// Address to write to (hex format: 0x1000 or decimal)
        #[arg(value_parser = hex::parse_address)]
        address: u64,
        /// Bytes to write, as hex ("90 90 cc" or "9090cc")
        #[arg(value_parser = hex::parse_bytes)]
        data: Vec<u8>,
    },
    /// Move the pointer by a relative amount
    #[command(allow_negative_numbers = true)]
    Mouse
    {
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
    },
    /// Press and release a key
    Key
    {
        /// Linux key code (1 is Escape)
        code: i32,
    },
    /// Round-trip every command against this process
    Selftest,
}

fn main()
{
    let cli = Cli::parse();

    let logging = match cli.log_level {
        Some(level) => init_logging_with_level(level, cli.log_format),
        None => init_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(target_os = "linux")]
fn run(command: Commands) -> Result<(), Box<dyn Error>>
{
    let client = client::Client::open()?;
    let result = match command {
        Commands::Read { pid, address, size } => client.read(pid, address, size).map(|bytes| {
            print!("{}", hex::dump(address, &bytes));
        }),
        Commands::Write { pid, address, data } => client.write(pid, address, &data).map(|count| {
            println!("Wrote {} of {} bytes to {:#x} in process {}", count, data.len(), address, pid);
        }),
        Commands::Mouse { dx, dy } => client.mouse_move(dx, dy).map(|()| println!("Moved pointer by ({dx}, {dy})")),
        Commands::Key { code } => client.tap_key(code).map(|()| println!("Pressed and released key {code}")),
        Commands::Selftest => client.selftest(),
    };
    client.close();
    result
}

#[cfg(not(target_os = "linux"))]
fn run(_command: Commands) -> Result<(), Box<dyn Error>>
{
    Err("procgate needs procfs, which this platform does not provide".into())
}
