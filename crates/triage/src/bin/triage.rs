//! Operator CLI for the maintenance ticket backend.
//!
//! Thin presentation glue over the library: every business rule lives in
//! `triage::tickets`, this binary only parses arguments, prints results, and
//! surfaces the assign/reassign confirmation step.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use triage::{
    fetch_ticket, list_tickets, search_persons, ApiClient, Config, Priority,
    ReferenceDataCache, StaticTokenProvider, TicketListQuery, TicketStatus, TicketWorkflow,
};

#[derive(Parser)]
#[command(name = "triage", about = "Maintenance ticket triage CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tickets, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show a single ticket.
    Show { id: String },
    /// Assign a ticket to one or more people by full name.
    Assign {
        id: String,
        /// Full names ("First Last"), repeatable.
        #[arg(required = true)]
        names: Vec<String>,
        /// Confirm the assignment without prompting.
        #[arg(long)]
        yes: bool,
    },
    /// Set a ticket's priority.
    Priority {
        id: String,
        priority: String,
    },
    /// Mark a ticket done.
    Done { id: String },
    /// Reopen a done ticket.
    Reopen { id: String },
    /// Cancel a ticket with a reason.
    Cancel {
        id: String,
        reason: String,
    },
    /// List assignable people (directory or fallback).
    People {
        #[arg(long)]
        q: Option<String>,
    },
    /// List active categories and subcategories.
    Categories,
}

fn parse_status(s: &str) -> Result<TicketStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_uppercase()))
        .with_context(|| format!("unknown status: {s}"))
}

fn parse_priority(s: &str) -> Result<Priority> {
    serde_json::from_value(serde_json::Value::String(s.to_uppercase()))
        .with_context(|| format!("unknown priority: {s}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_env("TRIAGE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::default();

    let tokens = Arc::new(StaticTokenProvider::new(config.api_token.clone()));
    let client =
        ApiClient::new(config.api_base.clone(), tokens).context("failed to build API client")?;
    let cache = Arc::new(ReferenceDataCache::new());

    match cli.command {
        Command::List { status, limit } => {
            let query = TicketListQuery {
                status: status.as_deref().map(parse_status).transpose()?,
                limit: Some(limit.unwrap_or(config.page_limit)),
                ..TicketListQuery::default()
            };
            let tickets = list_tickets(&client, &query).await?;
            for t in tickets {
                println!(
                    "{}  {:9}  {:6}  {}",
                    t.id,
                    t.status.as_str(),
                    t.priority.map_or("-".to_string(), |p| p.to_string()),
                    t.description.as_deref().unwrap_or("")
                );
            }
        }
        Command::Show { id } => {
            let ticket = fetch_ticket(&client, &id).await?;
            println!("{}", serde_json::to_string_pretty(&ticket)?);
        }
        Command::Assign { id, names, yes } => {
            cache.load(&client).await?;
            let mut workflow = TicketWorkflow::open(client, cache, &id).await?;
            let plan = workflow.plan_assignment(&names).await?;

            let verb = match plan.kind {
                triage::AssignmentKind::Assign => "assign",
                triage::AssignmentKind::Reassign => "reassign",
            };
            println!("Will {verb} {} to: {}", id, plan.resolved.join(", "));
            if !plan.skipped.is_empty() {
                println!("Skipped (not found): {}", plan.skipped.join(", "));
            }
            if !yes {
                println!("Re-run with --yes to confirm the {verb}.");
                return Ok(());
            }

            workflow.apply_assignment(&plan).await?;
            println!("Ticket {} is now {}", id, workflow.ticket().status);
        }
        Command::Priority { id, priority } => {
            let priority = parse_priority(&priority)?;
            let mut workflow = TicketWorkflow::open(client, cache, &id).await?;
            workflow.set_priority(priority).await?;
            println!("Ticket {} priority updated", id);
        }
        Command::Done { id } => {
            let mut workflow = TicketWorkflow::open(client, cache, &id).await?;
            workflow.mark_done().await?;
            println!("Ticket {} is now {}", id, workflow.ticket().status);
        }
        Command::Reopen { id } => {
            let mut workflow = TicketWorkflow::open(client, cache, &id).await?;
            workflow.reopen().await?;
            println!("Ticket {} is now {}", id, workflow.ticket().status);
        }
        Command::Cancel { id, reason } => {
            if !TicketWorkflow::can_cancel(&reason) {
                anyhow::bail!("a non-empty cancellation reason is required");
            }
            let mut workflow = TicketWorkflow::open(client, cache, &id).await?;
            workflow.cancel(&reason, None).await?;
            println!("Ticket {} is now {}", id, workflow.ticket().status);
        }
        Command::People { q } => {
            if let Some(q) = q {
                for person in search_persons(&client, &q, 20).await? {
                    println!("{}  {}", person.id, person.full_name());
                }
            } else {
                cache.load(&client).await?;
                if let Some(error) = cache.last_error().await {
                    eprintln!("directory degraded: {error}");
                }
                for name in cache.people_names().await {
                    println!("{name}");
                }
            }
        }
        Command::Categories => {
            cache.load(&client).await?;
            for category in cache.categories().await {
                println!("{}  ({})", category.display_name, category.name);
                for sub in category.subcategories {
                    println!("  {}  ({})", sub.display_name, sub.name);
                }
            }
        }
    }

    Ok(())
}
