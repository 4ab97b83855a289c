mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use serde_json::Value;
use texbox::api;
use texbox::config::Config;
use texbox::observability;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve(args) => api::run(config, args.address).await?,
        Commands::Run(args) => {
            let raw = tokio::fs::read(&args.input).await?;
            let mut job: Value = serde_json::from_slice(&raw)?;
            let input = match job.get_mut("input") {
                Some(input) => input.take(),
                None => job,
            };

            let state = api::build_state(config)?;
            let output = api::dispatch(state.orchestrator.clone(), input).await;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
