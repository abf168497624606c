use clap::Parser;
use murmur_cli::cli::{run, Cli};
use murmur_core::tracing_setup::init_tracing_with_default;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries only JSON
    init_tracing_with_default("warn");

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
