//! Raw instrumentation events and the feed boundary.
//!
//! The probe-injection mechanism is host-specific; the core only ever sees
//! an ordered stream of enter/exit/throw events per activation context,
//! delivered through the [`EventFeed`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::capture::error::FeedError;
use crate::trace::record::{ActivationId, TargetId};
use crate::trace::value::ValueSnapshot;

/// Serialized error payload on a throw event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    pub kind: String,
    pub message: Option<String>,
    pub value: Option<ValueSnapshot>,
}

/// One probe event as emitted by the instrumentation collaborator.
///
/// Enter/exit pairs are well-nested per activation context; violations are
/// handled by the capture session, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    Enter {
        activation: ActivationId,
        target: TargetId,
        receiver: Option<ValueSnapshot>,
        arguments: Vec<ValueSnapshot>,
    },
    Exit {
        activation: ActivationId,
        /// Absent for unit/void targets.
        return_value: Option<ValueSnapshot>,
    },
    Throw {
        activation: ActivationId,
        error: RawError,
    },
}

impl RawEvent {
    pub fn activation(&self) -> &ActivationId {
        match self {
            Self::Enter { activation, .. }
            | Self::Exit { activation, .. }
            | Self::Throw { activation, .. } => activation,
        }
    }

    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::Enter { .. } => "enter",
            Self::Exit { .. } => "exit",
            Self::Throw { .. } => "throw",
        }
    }
}

/// The instrumentation boundary: one method, deliver the next event.
///
/// `Ok(None)` means the feed is exhausted (target exited, stream closed).
#[async_trait]
pub trait EventFeed: Send {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, FeedError>;
}

/// Feed adapter over any line-oriented byte stream carrying one JSON event
/// per line (a probe pipe, a headerless tape).
///
/// Malformed lines are logged and skipped so a single bad probe emission
/// does not poison the session.
pub struct JsonlEventFeed<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> JsonlEventFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

impl JsonlEventFeed<tokio::fs::File> {
    pub async fn open(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(Self::new(tokio::fs::File::open(path).await?))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventFeed for JsonlEventFeed<R> {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, FeedError> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            tracing::trace!("feed raw line: {}", &line);

            match serde_json::from_str::<RawEvent>(&line) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    tracing::warn!("Failed to parse feed line: {e}. Line: {line}");
                    // Continue processing - don't fail on a single parse error
                }
            }
        }
        Ok(None)
    }
}
