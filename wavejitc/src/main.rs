//! `wavejitc`: assembles the reference oscillator program (44.1 kHz, 12-entry
//! table, one generator, four samples), compiles it for this machine, runs it
//! once and prints the program, the returned byte and a dump of the code.
//!
//! Set `RUST_LOG` to change the log filter.

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use wavejit::{schema::SCHEMA_VERSION, PreludeConfig, Runtime};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wavejit=debug,wavejitc=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let config = PreludeConfig::default();
    let rt = Runtime::new();
    info!(
        target_arch = rt.backend().target(),
        schema_version = SCHEMA_VERSION,
        sample_rate = config.sample_rate,
        table_size = config.table_size,
        sample_count = config.sample_count,
        "running reference program"
    );

    let (program, code) = rt.compile(&config).unwrap_or_else(|e| {
        error!("{} stage failed: {e}", e.stage());
        std::process::exit(1);
    });
    println!("{program}");

    let execution = rt.execute(&code).unwrap_or_else(|e| {
        error!("{} stage failed: {e}", e.stage());
        std::process::exit(1);
    });
    print!("{execution}");
}
