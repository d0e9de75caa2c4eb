use anyhow::Result;
use clap::Parser;
use meetscribe::{
    app,
    cli::{handle_meetings_command, handle_recover_command, Cli, CliCommand},
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Meetscribe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Replay(args)) => {
            let config = Config::load()?;
            app::run_replay(&config, &args.script).await
        }
        Some(CliCommand::Meetings(args)) => {
            let config = Config::load()?;
            handle_meetings_command(&config, args).await
        }
        Some(CliCommand::Recover) => handle_recover_command().await,
        None => {
            Config::load()?;
            println!("No command given. Try `meetscribe --help`.");
            Ok(())
        }
    }
}
