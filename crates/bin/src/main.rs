use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;
mod session;

use cli::{Cli, Commands};
use output::OutputFormat;
use session::Session;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dashfields=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let session = Session::open(&cli)?;

    match &cli.command {
        Commands::List => commands::read::list(&session, format),
        Commands::Show(args) => commands::read::show(&session, args, format).await,
        Commands::Get(args) => commands::read::get(&session, args, format).await,
        Commands::Set(args) => commands::write::set(&session, args).await,
        Commands::Remove(args) => commands::write::remove(&session, args).await,
        Commands::Delegate(args) => commands::write::delegate(&session, args, format).await,
        Commands::Alias(args) => commands::write::alias(&session, args, format).await,
    }
}
