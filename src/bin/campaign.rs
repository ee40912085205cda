//! Command-line access to campaigns in the JSON file store.
//!
//! Usage:
//!   cargo run --bin campaign -- list
//!   cargo run --bin campaign -- create "Spring launch" --subject "Hi {{name}}" --html-file body.html
//!   cargo run --bin campaign -- import <id> recipients.csv
//!   cargo run --bin campaign -- draft <id>
//!   cargo run --bin campaign -- send <id> --from "Team <team@example.com>"

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use campaign_mailer::{
    build_default_service,
    config::Config,
    init_tracing,
    models::Templates,
    service::{DraftOptions, SendOptions},
};

#[derive(Parser)]
#[command(name = "campaign")]
#[command(about = "Manage and run outbound email campaigns", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List campaigns with per-status recipient counts
    List,
    /// Create a campaign from template strings or files
    Create {
        name: String,
        #[arg(long, default_value = "")]
        goal: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long)]
        html_file: Option<PathBuf>,
        #[arg(long)]
        text_file: Option<PathBuf>,
    },
    /// Print a campaign as JSON
    Show { id: String },
    /// Import recipients from a CSV file with an `email` column
    Import {
        id: String,
        csv: PathBuf,
        /// Replace existing recipients instead of appending
        #[arg(long)]
        replace: bool,
    },
    /// Generate LLM drafts for every recipient not yet sent
    Draft {
        id: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Send to every recipient not yet sent
    Send {
        id: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        reply_to: Option<String>,
        #[arg(long)]
        tracking: bool,
        #[arg(long)]
        batch_size: Option<i64>,
        #[arg(long)]
        cooldown_minutes: Option<f64>,
    },
}

fn read_optional(path: Option<PathBuf>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display())),
        None => Ok(String::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load()?);
    init_tracing(&config);
    let service = build_default_service(config)?;

    match cli.command {
        Commands::List => {
            for c in service.list().await? {
                let [pending, drafted, sent, failed] = c.status_counts();
                println!(
                    "{}  {}  recipients={} pending={} drafted={} sent={} failed={}",
                    c.id,
                    c.name,
                    c.recipients.len(),
                    pending,
                    drafted,
                    sent,
                    failed
                );
            }
        }
        Commands::Create {
            name,
            goal,
            subject,
            html_file,
            text_file,
        } => {
            let templates = Templates {
                goal,
                subject,
                html: read_optional(html_file)?,
                text: read_optional(text_file)?,
            };
            let c = service.create(&name, templates).await?;
            println!("{}", c.id);
        }
        Commands::Show { id } => {
            let c = service.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&c)?);
        }
        Commands::Import { id, csv, replace } => {
            let text = std::fs::read_to_string(&csv)
                .with_context(|| format!("reading {}", csv.display()))?;
            let summary = service.import_recipients(&id, &text, replace).await?;
            println!(
                "added {} (total {}), skipped rows {:?}, duplicates {}",
                summary.added,
                summary.total,
                summary.skipped_rows,
                summary.duplicates.len()
            );
        }
        Commands::Draft {
            id,
            model,
            instructions,
        } => {
            let summary = service
                .draft_all(
                    &id,
                    DraftOptions {
                        api_key: None,
                        model,
                        instructions,
                    },
                )
                .await?;
            println!(
                "drafted {}, failed {}, skipped {}",
                summary.drafted, summary.failed, summary.skipped
            );
        }
        Commands::Send {
            id,
            from,
            reply_to,
            tracking,
            batch_size,
            cooldown_minutes,
        } => {
            let results = service
                .send_all(
                    &id,
                    SendOptions {
                        api_key: None,
                        from,
                        reply_to,
                        enable_tracking: tracking,
                        batch_size,
                        cooldown_minutes,
                    },
                )
                .await?;
            for r in &results {
                match &r.error {
                    None => println!("ok      {}", r.id),
                    Some(e) => println!("failed  {}  {}", r.id, e),
                }
            }
            let ok = results.iter().filter(|r| r.ok).count();
            println!("{} sent, {} failed", ok, results.len() - ok);
        }
    }

    Ok(())
}
