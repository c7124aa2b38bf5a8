//! Command-line interface for tickwatch.
//!
//! This binary provides a CLI for posting alerts to the daemon and
//! managing its alert, ignore and snooze lists via the HTTP API.

use anyhow::Result;
use clap::{Parser, Subcommand};

use tickwatch::api_client::types::{AlertPatchRequest, AlertResponse, SettingsPatchRequest};
use tickwatch::api_client::{self, List};
use tickwatch::types::Direction;

#[derive(Parser, Debug)]
#[command(name = "tickwatch-cli", version, about = "Control the tickwatch daemon")]
struct Cli {
    /// API base URL.
    #[arg(long, env = "TICKWATCH_API_URL", default_value = api_client::DEFAULT_BASE_URL)]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show daemon health and settings.
    Status,

    /// Post an alert.
    Alert {
        symbol: String,
        /// Mark the alert high priority.
        #[arg(long)]
        high: bool,
    },

    /// List visible alerts.
    List,

    /// Hide an alert and start its cooldown.
    Hide { symbol: String },

    /// Cancel a hide cooldown.
    Reveal { symbol: String },

    /// Remove an alert from view.
    Dismiss { symbol: String },

    /// Star or unstar an alert.
    Star {
        symbol: String,
        #[arg(long)]
        off: bool,
    },

    /// Set an alert's trade direction (none, bullish, bearish).
    Direction { symbol: String, direction: Direction },

    /// Mark every alert read.
    Read,

    /// Forget every alert and cooldown.
    Clear,

    /// Manage the ignore list.
    Ignore {
        #[command(subcommand)]
        command: ListCommand,
    },

    /// Manage the snooze list.
    Snooze {
        #[command(subcommand)]
        command: ListCommand,
    },

    /// Change runtime settings.
    Set {
        /// Hide cooldown in seconds.
        #[arg(long)]
        hiding_timeout: Option<u64>,
        /// Daily snooze clear time, HH:MM.
        #[arg(long)]
        snooze_clear_time: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ListCommand {
    /// Show the list.
    List,
    /// Add a symbol.
    Add { symbol: String },
    /// Remove a symbol.
    Remove { symbol: String },
    /// Empty the list.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = api_client::Client::with_base_url(cli.api_url);

    match cli.command {
        Command::Status => cmd_status(&client).await?,
        Command::Alert { symbol, high } => {
            let response = client.post_alert(&symbol, high).await?;
            print_response(&symbol, &response);
        }
        Command::List => cmd_list(&client).await?,
        Command::Hide { symbol } => print_changed("hide", client.hide(&symbol).await?.changed),
        Command::Reveal { symbol } => {
            print_changed("reveal", client.reveal(&symbol).await?.changed)
        }
        Command::Dismiss { symbol } => {
            print_changed("dismiss", client.dismiss(&symbol).await?.changed)
        }
        Command::Star { symbol, off } => {
            let patch = AlertPatchRequest {
                starred: Some(!off),
                ..Default::default()
            };
            let alert = client.patch_alert(&symbol, &patch).await?;
            println!("{}: starred={}", alert.symbol, alert.is_starred);
        }
        Command::Direction { symbol, direction } => {
            let patch = AlertPatchRequest {
                direction: Some(direction),
                ..Default::default()
            };
            let alert = client.patch_alert(&symbol, &patch).await?;
            println!("{}: direction={}", alert.symbol, alert.direction);
        }
        Command::Read => {
            let result = client.mark_all_read().await?;
            println!("Marked {} alert(s) read", result.changed);
        }
        Command::Clear => {
            client.clear_alerts().await?;
            println!("Cleared");
        }
        Command::Ignore { command } => cmd_list_edit(&client, List::Ignored, command).await?,
        Command::Snooze { command } => cmd_list_edit(&client, List::Snoozed, command).await?,
        Command::Set {
            hiding_timeout,
            snooze_clear_time,
        } => {
            let patch = SettingsPatchRequest {
                hiding_timeout_secs: hiding_timeout,
                snooze_clear_time,
                ..Default::default()
            };
            client.patch_settings(&patch).await?;
            cmd_status(&client).await?;
        }
    }

    Ok(())
}

/// Print daemon health and the current settings.
async fn cmd_status(client: &api_client::Client) -> Result<()> {
    let health = client.health().await?;
    let settings = client.settings().await?;

    println!("Status:          {}", health.status);
    println!("Visible alerts:  {}", health.visible);
    if let Some(error) = &health.store_error {
        println!("Store error:     {error}");
    }
    println!("Hiding timeout:  {} s", settings.hiding_timeout_secs);
    println!("Snooze clears:   {}", settings.snooze_clear_time);
    if let Some(next) = settings.next_snooze_clear_at {
        println!("Next clear:      {next}");
    }
    println!(
        "Notifications:   in-app={} desktop={} sound={}",
        settings.notifications.in_app, settings.notifications.desktop, settings.notifications.sound
    );

    Ok(())
}

/// Print the visible alerts, most recent first.
async fn cmd_list(client: &api_client::Client) -> Result<()> {
    let alerts = client.alerts().await?;
    if alerts.is_empty() {
        println!("(no alerts)");
        return Ok(());
    }

    for alert in &alerts {
        let unread = if alert.is_unread { "*" } else { " " };
        let star = if alert.is_starred { "★" } else { " " };
        println!(
            "{unread}{star} {:<12} {:<8} {}",
            alert.symbol, alert.direction, alert.first_seen_at
        );
    }
    Ok(())
}

async fn cmd_list_edit(client: &api_client::Client, list: List, command: ListCommand) -> Result<()> {
    match command {
        ListCommand::List => {
            let symbols = client.list(list).await?;
            if symbols.is_empty() {
                println!("(empty)");
            }
            for symbol in symbols {
                println!("{symbol}");
            }
        }
        ListCommand::Add { symbol } => print_changed("add", client.add(list, &symbol).await?.changed),
        ListCommand::Remove { symbol } => {
            print_changed("remove", client.remove(list, &symbol).await?.changed)
        }
        ListCommand::Clear => {
            client.clear(list).await?;
            println!("Cleared");
        }
    }
    Ok(())
}

fn print_response(symbol: &str, response: &AlertResponse) {
    match (response.surfaced, response.reason) {
        (true, _) => {
            let kind = if response.was_new == Some(true) { "new" } else { "resurfaced" };
            println!("{symbol}: surfaced ({kind})");
        }
        (false, Some(reason)) => println!("{symbol}: suppressed ({reason})"),
        (false, None) => println!("{symbol}: suppressed"),
    }
}

fn print_changed(action: &str, changed: bool) {
    if changed {
        println!("{action}: done");
    } else {
        println!("{action}: nothing to do");
    }
}
