//! Watch command - follow session, liveness and result events

use crate::commands::market;
use crate::config::AppConfig;
use crate::display;
use colored::*;
use sentimarket_state::SessionEvent;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Interval between simulated worker results
const SIMULATED_TRAFFIC_EVERY: Duration = Duration::from_secs(4);

/// Print events until Ctrl-C or until `duration` has passed
pub async fn run(config: &AppConfig, duration: Option<Duration>) -> anyhow::Result<()> {
    let opened = market::open(config, true).await?;
    let session = &opened.session;
    let mut events = session.subscribe();

    let traffic = opened
        .sim
        .as_ref()
        .map(|sim| sim.spawn_traffic(SIMULATED_TRAFFIC_EVERY));
    session.liveness().refresh_now();

    if !config.json {
        display::section("Watching marketplace events");
        display::info("Press Ctrl-C to stop");
        println!();
    }

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            received = events.recv() => match received {
                Ok(event) => print_event(&event, config.json)?,
                Err(RecvError::Lagged(skipped)) => {
                    if !config.json {
                        display::warning(&format!("Skipped {skipped} events"));
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(traffic) = traffic {
        traffic.abort();
    }
    session.shutdown();
    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", event.to_json_line()?);
        return Ok(());
    }
    let time = event.timestamp().format("%H:%M:%S").to_string();
    match event {
        SessionEvent::ResultReceived { result, .. } => {
            print!("  {} ", time.bright_black());
            display::result(result);
        }
        SessionEvent::LivenessUpdated { snapshot, .. } if snapshot.last_error.is_some() => {
            println!("  {} {}", time.bright_black(), event.summary().yellow());
        }
        _ => println!("  {} {}", time.bright_black(), event.summary()),
    }
    Ok(())
}
