//! Aurum command-line client
//!
//! Drives the session layer the way the app shell does: restore on start,
//! then the requested action.

mod console;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use aurum_core::{App, AuthSnapshot, Config, Outcome, SessionManager};

use crate::console::ConsoleProvider;

#[derive(Parser)]
#[command(name = "aurum")]
#[command(about = "Aurum client session tool")]
#[command(version)]
struct Cli {
    /// Keep the session credential in memory only
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who is signed in
    Status,
    /// Sign in through the identity provider
    Login,
    /// Handle a URL as if the app had been opened with it
    Open {
        /// Deep link, e.g. aurum:///#session_id=...
        url: String,
    },
    /// Sign out
    Logout,
    /// Read deep links from stdin, one per line, until EOF or Ctrl-C
    Listen,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aurum_core::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid AURUM_* configuration")?;
    let provider = Arc::new(ConsoleProvider::new(config.web_origin.is_some()));

    let app = if cli.no_persist {
        App::in_memory(config, provider)?
    } else {
        App::new(config, provider).context("failed to open local storage")?
    };

    let initial_url = match &cli.command {
        Commands::Open { url } => Some(url.as_str()),
        _ => None,
    };
    app.start(initial_url).await;

    let manager = app.session_manager();
    match cli.command {
        Commands::Status | Commands::Open { .. } => {}
        Commands::Login => {
            if manager.is_authenticated() {
                println!("Already signed in.");
            } else if manager.login().await == Outcome::Ignored {
                println!("Login is not available right now.");
            }
        }
        Commands::Logout => {
            manager.logout().await;
        }
        Commands::Listen => listen(manager).await?,
    }

    print_snapshot(&manager.snapshot());
    Ok(())
}

async fn listen(manager: &SessionManager) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(16);
    let listener = manager.listen(rx)?;

    let mut changes = manager.state_changes();
    let printer = tokio::spawn(async move {
        while let Ok(change) = changes.recv().await {
            println!("{} -> {}", change.from, change.to);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupted = loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if tx.send(line).await.is_err() {
                        break false;
                    }
                }
                None => break false,
            },
            _ = tokio::signal::ctrl_c() => break true,
        }
    };

    drop(tx);
    if interrupted {
        listener.close().await;
    } else {
        listener.join().await;
    }
    printer.abort();
    Ok(())
}

fn print_snapshot(snapshot: &AuthSnapshot) {
    match &snapshot.user {
        Some(user) if snapshot.is_authenticated() => {
            println!("Signed in as {} <{}>", user.name, user.email);
            println!("  id:   {}", user.id);
            println!("  gold: {:.4} g", user.gold_balance);
        }
        _ => println!("Not signed in ({}).", snapshot.state),
    }
}
