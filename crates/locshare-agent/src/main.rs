//! # locshare
//!
//! Command-line front end for the locshare client core.
//!
//! One-shot commands manage the identity, log in, list or create groups,
//! and send or fetch a single position. `run` starts the recurring fan-out
//! and retrieval loops and keeps them going until Ctrl+C.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use locshare_client::{
    ClientConfig, FanoutOutcome, FixedPosition, HttpServerApi, PipelineEvent, Scheduler, Session,
};
use locshare_shared::types::{Coordinates, IdentityOptions, KeyId};
use locshare_shared::CryptoEngine;
use locshare_store::SqliteSecretStore;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,locshare_client=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let mut config = ClientConfig::from_env();
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    tracing::debug!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the secret store and wire the session
    // -----------------------------------------------------------------------
    let store = match &config.data_dir {
        Some(dir) => SqliteSecretStore::open_in(dir),
        None => SqliteSecretStore::open_default(),
    }
    .context("failed to open the secret store")?;
    let api = HttpServerApi::new(config.http_timeout)?;
    let session = Session::new(Arc::new(store), engine(), Arc::new(api));

    // -----------------------------------------------------------------------
    // 4. Dispatch
    // -----------------------------------------------------------------------
    match cli.command {
        Command::Init {
            name,
            email,
            comment,
        } => {
            let options = IdentityOptions {
                name,
                email,
                comment,
            };
            let key_id = session.generate_and_persist_identity(&options).await?;
            println!("{key_id}");
        }
        Command::Server { url } => {
            let url = session.save_server_url(&url)?;
            println!("Server set to {url}");
        }
        Command::Register => {
            let resp = session.register_with_server().await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Command::Login => {
            session.authenticate().await?;
            println!("Logged in");
        }
        Command::Logout => {
            if session.logout()? {
                println!("Logged out");
            } else {
                println!("No session to close");
            }
        }
        Command::Whoami => match session.load_existing_key_id() {
            Some(key_id) => println!("{key_id}"),
            None => println!("No identity. Run `locshare init` first."),
        },
        Command::ExportKey => {
            print!("{}", session.export_public_key()?);
        }
        Command::Groups => {
            let auth = session.auth_context()?;
            for group in session.list_groups(&auth).await? {
                let members: Vec<String> = group
                    .recipients()
                    .map(|m| match &m.full_name {
                        Some(name) => format!("{name} ({})", m.keyid.short()),
                        None => m.keyid.to_string(),
                    })
                    .collect();
                println!("{}\t{}\t{}", group.id, group.name, members.join(", "));
            }
        }
        Command::CreateGroup { name, members } => {
            let resp = session.create_group(&name, &members).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Command::Send { lat, lon } => {
            match session.send_location(&Coordinates::new(lat, lon)).await? {
                FanoutOutcome::Completed(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?)
                }
                FanoutOutcome::Skipped => println!("Another fan-out is running"),
            }
        }
        Command::Fetch { limit } => {
            let report = session
                .fetch_locations(limit.unwrap_or(config.retrieval_limit))
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ForgetKey { key_id } => {
            if session.forget_cached_key(&KeyId::new(key_id))? {
                println!("Cached key removed");
            } else {
                println!("Key was not cached");
            }
        }
        Command::Run { lat, lon } => run(session, &config, Coordinates::new(lat, lon)).await?,
    }

    Ok(())
}

async fn run(session: Session, config: &ClientConfig, coords: Coordinates) -> anyhow::Result<()> {
    let mut events = session.events().subscribe();
    let position = Arc::new(FixedPosition(coords));
    let handle = Scheduler::new(session, position, config).start();

    info!("Sharing location, press Ctrl+C to stop");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PipelineEvent::MarkersUpdated { markers }) => {
                    for marker in markers {
                        println!(
                            "{}\t{}\t{:.5}\t{:.5}",
                            marker.timestamp,
                            marker.user,
                            marker.latitude(),
                            marker.longitude()
                        );
                    }
                }
                Ok(PipelineEvent::TickFailed { pipeline, error }) => {
                    eprintln!("{pipeline} failed: {error}");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event consumer lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[cfg(feature = "openpgp")]
fn engine() -> Arc<dyn CryptoEngine> {
    Arc::new(locshare_shared::OpenPgpEngine::new())
}

#[cfg(not(feature = "openpgp"))]
fn engine() -> Arc<dyn CryptoEngine> {
    Arc::new(locshare_shared::NativeEngine::new())
}
