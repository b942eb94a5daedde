//! CLI module
//!
//! This module provides the command-line interface for autopm: `serve` runs the
//! dashboard, every other subcommand drives a running server over HTTP.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    ai::{AiConfig, GeminiTransport, PlanClient, API_KEY_ENV, DEFAULT_ENDPOINT, DEFAULT_MODEL},
    api::{serve, AppState, Client, ClientConfig, ServerConfig},
    models::{Context, Core, FileItem, LogEntry, LogKind, NewTask, Priority, TaskStatus, ThinkingPlan},
    sync::{PlanSync, SyncConfig, SyncOutcome},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(short, long, default_value = "http://localhost:3000")]
    server: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the autopm dashboard server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Seconds between automatic plan syncs
        #[arg(long, default_value_t = 45)]
        sync_interval_secs: u64,

        /// Model used for plans and architecture summaries
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Base URL of the generative-text service
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,

        /// API key for the generative-text service
        #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
        api_key: Option<String>,

        /// Per-request timeout for the AI service, in seconds
        #[arg(long)]
        request_timeout_secs: Option<u64>,

        /// Do not start the periodic sync loop
        #[arg(long)]
        no_sync: bool,
    },

    /// Show the task board
    Board,

    /// Task management commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Show the project tree
    Files,

    /// Run a dependency audit on a file
    Audit {
        /// File name as shown in the explorer
        name: String,
    },

    /// Switch the dashboard to another module
    Navigate {
        /// Tab name (e.g. dashboard, explorer)
        tab: String,
    },

    /// Show the terminal log
    Logs,

    /// Show the thinking feed
    Plans,

    /// Run a plan sync now
    Sync,

    /// Ask for an architecture summary of the project tree
    Analyze,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Add a new task to the backlog
    Add {
        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// low, medium or high
        #[arg(long)]
        priority: Option<Priority>,

        /// Tag to attach; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Move a task to another column
    Move {
        /// Task id
        id: String,

        /// backlog, in-progress, review or done
        status: TaskStatus,
    },
}

/// Run the CLI application
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve {
            port,
            sync_interval_secs,
            model,
            endpoint,
            api_key,
            request_timeout_secs,
            no_sync,
        } => {
            tracing_subscriber::fmt::init();
            println!("Starting autopm dashboard on port {}...", port);

            let core = Core::new(Context::seeded());
            core.boot();

            let transport = GeminiTransport::new(AiConfig {
                api_key: api_key.clone(),
                endpoint: endpoint.clone(),
                model: model.clone(),
                request_timeout: request_timeout_secs.map(Duration::from_secs),
            })?;
            if api_key.is_none() {
                tracing::warn!("{} is not set; AI requests will fail", API_KEY_ENV);
            }

            let planner = PlanClient::new(Arc::new(transport), model.clone());
            let sync = PlanSync::new(core.clone(), planner.clone());

            // Keep the handle alive for the lifetime of the server
            let _sync_handle = if *no_sync {
                None
            } else {
                Some(sync.start(SyncConfig {
                    interval: Duration::from_secs(*sync_interval_secs),
                }))
            };

            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };

            serve(
                AppState {
                    core,
                    sync,
                    planner,
                },
                config,
            )
            .await?;
            Ok(())
        }

        Commands::Board => {
            let client = create_client(&cli.server);
            let snapshot = client.get_dashboard().await?;

            for status in TaskStatus::ALL {
                let column: Vec<_> = snapshot
                    .tasks
                    .iter()
                    .filter(|task| task.status() == status)
                    .collect();
                println!("{} ({})", status.label().bold(), column.len());
                for task in column {
                    println!(
                        "  [{}] {} ({}) {}",
                        task.id(),
                        task.title(),
                        task.priority(),
                        task.tags().join(", ").dimmed()
                    );
                }
            }
            let sync_state = if snapshot.syncing { "syncing" } else { "idle" };
            println!(
                "\nSync: {} (last: {})",
                sync_state,
                snapshot.last_sync.as_deref().unwrap_or("never")
            );
            Ok(())
        }

        Commands::Task { command } => {
            let client = create_client(&cli.server);
            match command {
                TaskCommands::Add {
                    title,
                    description,
                    priority,
                    tags,
                } => {
                    let new_task = NewTask {
                        title: title.clone(),
                        description: description.clone(),
                        priority: *priority,
                        tags: tags.clone(),
                    };
                    let task = client.create_task(&new_task).await?;
                    println!("Added task \"{}\" with id {}", task.title(), task.id());
                }
                TaskCommands::Move { id, status } => {
                    let task = client.move_task(id, *status).await?;
                    println!("Moved \"{}\" to {}", task.title(), task.status().label());
                }
            }
            Ok(())
        }

        Commands::Files => {
            let client = create_client(&cli.server);
            let files = client.get_files().await?;
            print_files(&files, 0);
            Ok(())
        }

        Commands::Audit { name } => {
            let client = create_client(&cli.server);
            client.audit_file(name).await?;
            println!("Audit started for {}; results will appear in the log", name);
            Ok(())
        }

        Commands::Navigate { tab } => {
            let client = create_client(&cli.server);
            client.navigate(tab).await?;
            Ok(())
        }

        Commands::Logs => {
            let client = create_client(&cli.server);
            for entry in client.get_logs().await? {
                print_log_entry(&entry);
            }
            Ok(())
        }

        Commands::Plans => {
            let client = create_client(&cli.server);
            let plans = client.get_plans().await?;
            if plans.is_empty() {
                println!("No plans yet. Run 'autopm sync' to request some.");
            }
            print_plans(&plans);
            Ok(())
        }

        Commands::Sync => {
            let client = create_client(&cli.server);
            match client.sync().await? {
                SyncOutcome::Skipped => println!("A sync is already in flight"),
                SyncOutcome::Completed {
                    new_plans,
                    fallback: false,
                } => println!("Sync complete: {} new plans", new_plans),
                SyncOutcome::Completed { fallback: true, .. } => {
                    println!("{}", "Sync failed; fallback plan recorded".yellow())
                }
                SyncOutcome::Discarded => println!("Sync result discarded"),
            }
            Ok(())
        }

        Commands::Analyze => {
            let client = create_client(&cli.server);
            let summary = client.analyze().await?;
            println!("{}", summary);
            Ok(())
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(server_url: &str) -> Client {
    let config = ClientConfig {
        base_url: server_url.to_string(),
    };

    Client::with_config(config)
}

fn print_log_entry(entry: &LogEntry) {
    let message = match entry.kind {
        LogKind::Info => entry.message.normal(),
        LogKind::Error => entry.message.red(),
        LogKind::Success => entry.message.green(),
        LogKind::Ai => entry.message.cyan(),
    };
    println!("{} {}", format!("[{}]", entry.timestamp).dimmed(), message);
}

fn print_plans(plans: &[ThinkingPlan]) {
    let total = plans.len();
    for (i, plan) in plans.iter().enumerate() {
        println!(
            "{} {}",
            format!("Protocol_Node_{}", total - i).cyan(),
            plan.timestamp.dimmed()
        );
        println!("  {}", plan.thought);
        println!("  {} {}", "->".magenta(), plan.action);
    }
}

/// Recursively prints the tree with two spaces per level
fn print_files(items: &[FileItem], depth: usize) {
    let indent = "  ".repeat(depth);
    for item in items {
        if item.is_folder() {
            println!("{}{}/", indent, item.name().bold());
            print_files(item.children(), depth + 1);
        } else {
            println!("{}{}", indent, item.name());
        }
    }
}
