//! The `connect` command: one client, its event stream on the terminal

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::collections::HashSet;
use std::time::Duration;
use tether_client::{Client, ClientConfig, ClientEvent, ConnectionState};
use tether_core::{Frame, Message, Payload, CLOSE_NORMAL};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// What to do once the client exists
pub struct Options {
    pub topics: Vec<String>,
    pub every: Vec<String>,
    pub send: Vec<String>,
}

/// A JSON payload when the text parses as JSON, plain text otherwise
pub fn parse_payload(text: &str) -> Payload {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.is_object() || value.is_array() => Payload::Json(value),
        _ => Payload::Text(text.to_string()),
    }
}

/// Parse `"<interval ms>:<message>"`
pub fn parse_every(entry: &str) -> Result<(Duration, Payload)> {
    let (interval, message) = entry
        .split_once(':')
        .with_context(|| format!("Expected <ms>:<message>, got '{}'", entry))?;
    let ms: u64 = interval
        .trim()
        .parse()
        .with_context(|| format!("Invalid interval '{}'", interval))?;
    if message.is_empty() {
        bail!("Scheduled message is empty in '{}'", entry);
    }
    Ok((Duration::from_millis(ms), parse_payload(message)))
}

pub async fn run(
    config: ClientConfig,
    options: Options,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let schedule = options
        .every
        .iter()
        .map(|entry| parse_every(entry.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let auto_reconnect = config.auto_reconnect;
    println!(
        "{} Connecting to {}",
        "TETHER".cyan().bold(),
        config.url
    );

    let client = Client::new(config);
    let mut events = client.events();

    let topics: HashSet<String> = options.topics.iter().cloned().collect();
    for topic in &options.topics {
        let label = topic.clone();
        client.subscribe(topic, move |message: &Message| {
            println!("{} {}", format!("[{}]", label).magenta(), message);
        });
    }
    for (interval, message) in schedule {
        let id = client.add_task(message, interval)?;
        println!(
            "{} {} every {}ms",
            "TASK".blue(),
            id,
            interval.as_millis()
        );
    }

    let connected = tokio::select! {
        result = client.connect() => result,
        Some(()) = shutdown_rx.recv() => {
            client.disconnect();
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    };

    match connected {
        Ok(()) => {
            for message in &options.send {
                if !client.send(parse_payload(message)) {
                    warn!("Dropped send, connection not open");
                }
            }
        }
        Err(e) if auto_reconnect => {
            println!("{} {}", "ERR".red().bold(), e);
        }
        Err(e) => {
            drain(&mut events, &topics);
            return Err(e).context("Connection failed");
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    render(&event, &topics);
                    if matches!(event, ClientEvent::GaveUp { .. }) {
                        break;
                    }
                    if let ClientEvent::StateChanged(ConnectionState::Closed { code, .. }) = event {
                        if !auto_reconnect || code == CLOSE_NORMAL {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(()) = shutdown_rx.recv() => break,
        }
    }

    client.disconnect();
    drain(&mut events, &topics);
    println!("{}", "Disconnected".yellow());

    Ok(())
}

fn drain(events: &mut broadcast::Receiver<ClientEvent>, topics: &HashSet<String>) {
    while let Ok(event) = events.try_recv() {
        render(&event, topics);
    }
}

fn render(event: &ClientEvent, topics: &HashSet<String>) {
    match event {
        ClientEvent::StateChanged(state) => {
            println!("{} {}", "STATE".dimmed(), state);
        }
        ClientEvent::Info(text) => println!("{} {}", "INFO".cyan(), text),
        ClientEvent::Success(text) => println!("{} {}", "OK".green().bold(), text),
        ClientEvent::Error(text) => println!("{} {}", "ERR".red().bold(), text),
        ClientEvent::Received(message) => {
            // topic callbacks print these
            if message.topic().is_some_and(|t| topics.contains(t)) {
                return;
            }
            println!("{} {}", "RECV".green(), message);
        }
        ClientEvent::Sent(frame) => match frame {
            Frame::Text(text) => println!("{} {}", "SENT".blue(), text),
            Frame::Binary(data) => println!("{} <{} bytes>", "SENT".blue(), data.len()),
        },
        ClientEvent::Reconnecting { attempt, max } => {
            println!("{} attempt {}/{}", "RETRY".yellow(), attempt, max);
        }
        ClientEvent::GaveUp { attempts } => {
            println!(
                "{} gave up after {} attempts",
                "ERR".red().bold(),
                attempts
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_payload_json_or_text() {
        assert_eq!(
            parse_payload(r#"{"type":"ping"}"#),
            Payload::Json(json!({"type": "ping"}))
        );
        assert_eq!(parse_payload("hello"), Payload::Text("hello".into()));
        // scalars stay text
        assert_eq!(parse_payload("42"), Payload::Text("42".into()));
    }

    #[test]
    fn test_parse_every() {
        let (interval, message) = parse_every(r#"5000:{"type":"ping"}"#).unwrap();
        assert_eq!(interval, Duration::from_millis(5000));
        assert_eq!(message, Payload::Json(json!({"type": "ping"})));

        // only the first colon splits
        let (_, message) = parse_every("1000:a:b").unwrap();
        assert_eq!(message, Payload::Text("a:b".into()));
    }

    #[test]
    fn test_parse_every_rejects_garbage() {
        assert!(parse_every("ping").is_err());
        assert!(parse_every("soon:ping").is_err());
        assert!(parse_every("1000:").is_err());
    }
}
