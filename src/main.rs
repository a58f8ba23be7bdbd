mod config;
mod controller;
mod logging;
mod model;
mod remote;
mod search;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Runtime;

use config::Config;
use model::Contact;
use remote::{CrmApi, KeapClient};

#[derive(Parser, Debug)]
#[command(name = "keapdesk", about = "Terminal contact manager for Keap")]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query contacts by name (abook-compatible output for aerc/mutt)
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Search term (matches first or last name)
    query: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    logging::init(&config.logging)?;

    let runtime = Runtime::new().context("failed to start async runtime")?;
    let client = KeapClient::new(&config.api).context("failed to build API client")?;

    if let Some(Command::Query(args)) = cli.command {
        return handle_query(&runtime, &client, args);
    }

    run_ui(&config, &runtime, client)
}

fn run_ui(config: &Config, runtime: &Runtime, client: KeapClient) -> Result<()> {
    tracing::info!(config = %config.config_path.display(), "starting interface");
    let mut app = ui::app::App::new(config, Arc::new(client), runtime.handle().clone());
    app.run()
}

fn handle_query(runtime: &Runtime, client: &KeapClient, args: QueryArgs) -> Result<()> {
    let term = search::normalize_query(&args.query);
    let results = runtime
        .block_on(client.list_contacts(term.as_deref()))
        .map_err(|err| {
            tracing::warn!(
                kind = err.kind(),
                status = ?err.status(),
                correlation_id = ?err.correlation_id(),
                error = %err,
                "query failed"
            );
            err
        })
        .context("Failed to load contacts")?;

    for line in query_output(&args.query, &results) {
        println!("{line}");
    }

    Ok(())
}

/// abook-style query output: a header line, then `email<TAB>name<TAB>phone`
/// for every contact with a primary email.
fn query_output(query: &str, contacts: &[Contact]) -> Vec<String> {
    let rows: Vec<String> = contacts
        .iter()
        .filter_map(|contact| {
            let email = contact.primary_email()?;
            let phone = contact
                .primary_phone()
                .map(|p| p.number.as_str())
                .unwrap_or(" ");
            Some(format!("{}\t{}\t{}", email.email, contact.display_name(), phone))
        })
        .collect();

    // Header line (ignored by mutt/aerc)
    let header = if rows.is_empty() {
        format!("No matches for \"{}\"", query)
    } else {
        format!("Found {} contact(s) matching \"{}\"", rows.len(), query)
    };

    std::iter::once(header).chain(rows).collect()
}
