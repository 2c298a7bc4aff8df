use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "famshield-ctl")]
#[command(about = "FamShield policy and content check tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a package against a rule file
    Check {
        #[arg(help = "Package name to check")]
        package: String,

        #[arg(short, long, help = "JSON file with a rule list or a rules response")]
        rules: PathBuf,

        #[arg(long, help = "Activity class name reported for the package")]
        class: Option<String>,

        #[arg(long, help = "Display label of the app")]
        label: Option<String>,

        #[arg(long, help = "Local time to evaluate at, \"YYYY-MM-DD HH:MM\"")]
        at: Option<String>,

        #[arg(long, default_value_t = 0, help = "Seconds the app was used today")]
        app_seconds: u64,

        #[arg(long, default_value_t = 0, help = "Seconds the device was used today")]
        total_seconds: u64,

        #[arg(short, long, help = "Agent configuration for package lists and protection")]
        config: Option<PathBuf>,
    },

    /// Scan text for risky keywords
    Scan {
        text: String,

        #[arg(short, long, help = "JSON file with a keyword list or a keywords response")]
        keywords: Option<PathBuf>,

        #[arg(long, help = "List every matched keyword instead of the first")]
        all: bool,
    },

    /// Hash a parent PIN for the agent configuration
    HashPin,

    /// Show and validate the agent configuration
    Config {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { package, rules, class, label, at, app_seconds, total_seconds, config } => {
            let request = commands::check::CheckRequest {
                package,
                rules_path: rules,
                class_name: class,
                label,
                at,
                app_seconds,
                total_seconds,
                config_path: config,
            };
            commands::check::run(&request)?
        }
        Commands::Scan { text, keywords, all } => commands::scan::run(&text, keywords.as_deref(), all)?,
        Commands::HashPin => commands::pin::hash()?,
        Commands::Config { path } => commands::config::show(path.as_deref())?,
    }

    Ok(())
}
