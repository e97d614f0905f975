// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Paydesk - a multi-channel messaging worker for payment desks.
//!
//! This is the binary entry point: the worker (`serve`) and the operator
//! commands that manage connections, destinations and transactions.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use paydesk_core::TransactionStatus;

/// Paydesk - a multi-channel messaging worker for payment desks.
#[derive(Parser, Debug)]
#[command(name = "paydesk", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker until SIGINT or SIGTERM.
    Serve,
    /// Manage channel connections.
    #[command(subcommand)]
    Connection(ConnectionCommand),
    /// Manage payment destinations.
    #[command(subcommand)]
    Destination(DestinationCommand),
    /// Manage recorded transactions.
    #[command(subcommand)]
    Transaction(TransactionCommand),
}

#[derive(Subcommand, Debug)]
enum ConnectionCommand {
    /// Create a connection; a running worker starts its session.
    Add {
        #[arg(long)]
        name: String,
        /// Persona name used in replies.
        #[arg(long)]
        representative: String,
        /// Phone number for the pairing-code flow.
        #[arg(long)]
        phone: Option<String>,
    },
    /// List connections with their status.
    List,
    /// Delete a connection; a running worker tears down its session.
    Remove { id: String },
    /// Render the stored QR payload in the terminal.
    Qr { id: String },
}

#[derive(Subcommand, Debug)]
enum DestinationCommand {
    /// Add an active payment destination.
    Add {
        #[arg(long)]
        bank: String,
        #[arg(long)]
        holder: String,
        #[arg(long)]
        account: String,
        /// Volume limit; zero means unlimited.
        #[arg(long, default_value_t = 0.0)]
        limit: f64,
        /// Manual priority, clamped to 1..=10.
        #[arg(long, default_value_t = 5)]
        priority: i64,
    },
    /// List destinations with utilization.
    List,
}

#[derive(Subcommand, Debug)]
enum TransactionCommand {
    /// Move a transaction forward (pending, approved, rejected, credited).
    Advance { id: String, status: TransactionStatus },
    /// List transactions, newest first.
    List {
        #[arg(long)]
        status: Option<TransactionStatus>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => paydesk_config::load_and_validate_path(path),
        None => paydesk_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            paydesk_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Connection(cmd) => {
            let storage = match admin::open_storage(&config).await {
                Ok(storage) => storage,
                Err(e) => fail(e),
            };
            match cmd {
                ConnectionCommand::Add {
                    name,
                    representative,
                    phone,
                } => admin::connection_add(&storage, &name, &representative, phone).await,
                ConnectionCommand::List => admin::connection_list(&storage).await,
                ConnectionCommand::Remove { id } => admin::connection_remove(&storage, &id).await,
                ConnectionCommand::Qr { id } => admin::connection_qr(&storage, &id).await,
            }
        }
        Commands::Destination(cmd) => {
            let storage = match admin::open_storage(&config).await {
                Ok(storage) => storage,
                Err(e) => fail(e),
            };
            match cmd {
                DestinationCommand::Add {
                    bank,
                    holder,
                    account,
                    limit,
                    priority,
                } => {
                    admin::destination_add(&storage, bank, holder, account, limit, priority).await
                }
                DestinationCommand::List => admin::destination_list(&storage).await,
            }
        }
        Commands::Transaction(cmd) => {
            let storage = match admin::open_storage(&config).await {
                Ok(storage) => storage,
                Err(e) => fail(e),
            };
            match cmd {
                TransactionCommand::Advance { id, status } => {
                    admin::transaction_advance(&storage, &id, status).await
                }
                TransactionCommand::List { status } => {
                    admin::transaction_list(&storage, status).await
                }
            }
        }
    };

    if let Err(e) = result {
        fail(e);
    }
}

fn fail(e: paydesk_core::PaydeskError) -> ! {
    eprintln!("error: {e}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the stats epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn transaction_status_parses_from_arguments() {
        let cli = Cli::parse_from(["paydesk", "transaction", "advance", "tx-1", "credited"]);
        match cli.command {
            Commands::Transaction(TransactionCommand::Advance { id, status }) => {
                assert_eq!(id, "tx-1");
                assert_eq!(status, TransactionStatus::Credited);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = paydesk_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.worker.name, "paydesk");
    }
}
