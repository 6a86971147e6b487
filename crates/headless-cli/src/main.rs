//! headless-ctl
//!
//! Talks to a running headless host over its control socket.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use headless_ipc::{IpcClient, ResponseData, DEFAULT_SOCKET_PATH};

#[derive(Parser)]
#[command(name = "headless-ctl")]
#[command(about = "Control a running headless host")]
#[command(version)]
struct Cli {
    /// Control socket of the host
    #[arg(long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the host is answering
    Ping,

    /// Show engine and session status
    Status,

    /// Trigger an action, e.g. `action Common Quit`
    Action { group: String, item: String },

    /// Shut the host down
    Quit {
        /// Wait until the host has removed its socket
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    let client = IpcClient::with_socket_path(&cli.socket);
    tracing::debug!("Using control socket {}", cli.socket.display());

    if !client.is_host_running() {
        bail!("headless host is not running (no socket at {})", cli.socket.display());
    }

    match cli.command {
        Commands::Ping => cmd_ping(&client).await,
        Commands::Status => cmd_status(&client).await,
        Commands::Action { group, item } => {
            client
                .send_action(&group, &item)
                .await
                .with_context(|| format!("Failed to send action {}/{}", group, item))?;
            println!("✓ {}/{} sent", group, item);
            Ok(())
        }
        Commands::Quit { wait } => cmd_quit(&client, wait).await,
    }
}

async fn cmd_ping(client: &IpcClient) -> Result<()> {
    let start = std::time::Instant::now();
    client.ping().await.context("Ping failed")?;
    println!("✓ Pong! ({:.2}ms)", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

async fn cmd_status(client: &IpcClient) -> Result<()> {
    match client.get_status().await.context("Failed to get status")? {
        ResponseData::Status {
            version,
            backend,
            client: client_name,
            session,
            sample_rate,
            buffer_size,
            running,
            cycles,
            transport_speed,
            transport_position,
            warnings,
            errors,
            uptime_secs,
        } => {
            println!("Headless host v{}", version);
            println!();
            println!("  Session:    {}", session);
            println!("  Client:     {}", client_name);
            println!(
                "  Engine:     {} ({})",
                backend,
                if running { "running" } else { "stopped" }
            );
            println!("  Format:     {} Hz, {} frames", sample_rate, buffer_size);
            println!("  Cycles:     {}", cycles);
            println!(
                "  Transport:  speed {:.2}, {}",
                transport_speed,
                format_position(transport_position, sample_rate)
            );
            println!("  Messages:   {} warnings, {} errors", warnings, errors);
            println!("  Uptime:     {}", format_duration(uptime_secs));
        }
        other => bail!("Unexpected status response: {:?}", other),
    }
    Ok(())
}

async fn cmd_quit(client: &IpcClient, wait: bool) -> Result<()> {
    client.quit().await.context("Failed to send quit")?;
    println!("✓ Quit sent");

    if wait {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while client.is_host_running() {
            if std::time::Instant::now() > deadline {
                bail!("Host still running after 10s");
            }
            tracing::debug!("Waiting for host to exit");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        println!("✓ Host stopped.");
    }
    Ok(())
}

fn format_position(frames: u64, sample_rate: u32) -> String {
    if sample_rate == 0 {
        return format!("{} frames", frames);
    }
    let secs = frames / sample_rate as u64;
    format!("{} ({} frames)", format_duration(secs), frames)
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_action() {
        let cli = Cli::parse_from(["headless-ctl", "--socket", "/tmp/x.sock", "action", "Common", "Quit"]);
        assert_eq!(cli.socket, PathBuf::from("/tmp/x.sock"));
        assert!(matches!(
            cli.command,
            Commands::Action { ref group, ref item } if group == "Common" && item == "Quit"
        ));
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(96_000, 48_000), "2s (96000 frames)");
        assert_eq!(format_position(5, 0), "5 frames");
        assert_eq!(format_duration(3_700), "1h 1m");
    }
}
