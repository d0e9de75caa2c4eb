use crate::config::Config;
use crate::meetings::Meetings;
use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meetscribe")]
#[command(about = "Meeting transcript capture", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run a session lifecycle from a capture script
    Replay(ReplayCliArgs),
    /// List, export or post stored meetings
    Meetings(MeetingsCliArgs),
    /// File any unsaved session left by a crashed run
    Recover,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct ReplayCliArgs {
    /// Path to the capture script (JSON)
    pub script: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct MeetingsCliArgs {
    #[command(subcommand)]
    pub command: MeetingsCommand,
}

#[derive(Subcommand, Debug)]
pub enum MeetingsCommand {
    /// List stored meetings
    List,
    /// Export a meeting as a text file
    Export {
        /// Index from the list output
        index: usize,
        /// Output directory (default: configured export directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Post a meeting to the configured webhook
    Post {
        /// Index from the list output
        index: usize,
    },
}

pub async fn handle_meetings_command(config: &Config, args: MeetingsCliArgs) -> Result<()> {
    let meetings = Meetings::open_default()?;
    match args.command {
        MeetingsCommand::List => {
            let listed = meetings.list().await?;
            if listed.is_empty() {
                println!("No meetings stored yet.");
                return Ok(());
            }
            for m in listed {
                println!(
                    "[{}] {} | {} | {} | webhook: {:?}",
                    m.index, m.title, m.started, m.duration, m.post_status
                );
            }
        }
        MeetingsCommand::Export { index, out } => {
            let dir = match out {
                Some(dir) => dir,
                None => config.export_dir()?,
            };
            let path = meetings.export_at(index, &dir).await?;
            println!("Exported to {}", path.display());
        }
        MeetingsCommand::Post { index } => {
            let url = config
                .webhook
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("No webhook URL configured"))?;
            meetings
                .post_at(index, url, config.webhook.body_type)
                .await?;
            println!("Posted meeting {} to webhook", index);
        }
    }
    Ok(())
}

pub async fn handle_recover_command() -> Result<()> {
    let meetings = Meetings::open_default()?;
    let outcome = meetings.recover().await?;
    println!("Recovery: {:?}", outcome);
    Ok(())
}
