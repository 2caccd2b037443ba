use clap::Parser;
use habit_app::app::{run, AppConfig, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("habits: {err:#}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(config, cli.command).await {
        eprintln!("habits: {err:#}");
        std::process::exit(1);
    }
}
