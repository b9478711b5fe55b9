use std::sync::Arc;

use authlink::config::{load_config, print_schema};
use authlink::startup;
use authlink::utils::logger::init_logging;
use clap::Parser;

/// authlink session daemon
#[derive(Parser, Debug)]
#[command(name = "authlink")]
#[command(about = "Reconciles wallet and GitHub identity into one auth state", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(default_value = "./config.yaml")]
    config: String,

    /// Print the JSON schema of the configuration and exit
    #[arg(long)]
    schema: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.schema {
        print_schema();
        return;
    }

    let config = load_config(&cli.config);
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = startup::run(Arc::new(config)).await {
        tracing::error!("Server stopped with an error: {}", e);
        std::process::exit(1);
    }
}
