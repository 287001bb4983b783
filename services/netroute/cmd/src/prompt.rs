//! Interactive console: `DEST message` lines originate payloads and
//! received messages are printed as they arrive.

use crate::{component_debug, component_info, component_warn};
use netroute_routing::Delivery;
use netroute_session::{NodeError, NodeHandle};
use netroute_wire::NodeId;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

const HELP: &str = "commands: <DEST> <message> | stats | help";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    Send { destination: NodeId, data: String },
    Stats,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing message for {0} (expected: <DEST> <message>)")]
    MissingMessage(String),
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<PromptCommand>, PromptError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match (head, rest.is_empty()) {
        ("stats", true) => Ok(Some(PromptCommand::Stats)),
        ("help", true) | ("?", true) => Ok(Some(PromptCommand::Help)),
        (destination, true) => Err(PromptError::MissingMessage(destination.to_string())),
        (destination, false) => Ok(Some(PromptCommand::Send {
            destination: NodeId::from(destination),
            data: rest.to_string(),
        })),
    }
}

/// Read commands until `input` ends or the node stops
pub async fn run_prompt<R, W>(handle: NodeHandle, input: R, mut out: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                out.write_all(format!("{}\n", e).as_bytes()).await?;
                continue;
            }
        };

        match command {
            PromptCommand::Send { destination, data } => {
                match handle.send(destination.clone(), data).await {
                    Ok(()) => component_debug!("prompt", "Originated message to {}", destination),
                    Err(NodeError::Stopped) => break,
                    Err(e) => {
                        component_warn!("prompt", "Cannot send to {}: {}", destination, e);
                        out.write_all(format!("cannot send to {}: {}\n", destination, e).as_bytes())
                            .await?;
                    }
                }
            }
            PromptCommand::Stats => match handle.stats().await {
                Ok(stats) => {
                    let rendered = serde_json::to_string_pretty(&stats)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                    out.write_all(format!("{}\n", rendered).as_bytes()).await?;
                }
                Err(_) => break,
            },
            PromptCommand::Help => out.write_all(format!("{}\n", HELP).as_bytes()).await?,
        }
        out.flush().await?;
    }

    component_info!("prompt", "Console input closed");
    Ok(())
}

/// Print every delivery until the node drops its sender
pub async fn print_deliveries<W>(mut deliveries: mpsc::UnboundedReceiver<Delivery>, mut out: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(delivery) = deliveries.recv().await {
        out.write_all(format!("{}\n", delivery).as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}
