//! JSONL persistence for raw event streams.
//!
//! A tape is a header line (schema version, creation time) followed by one
//! entry per probe event. Tapes are the hand-off format between a live
//! capture and a later offline pipeline run.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::capture::error::FeedError;
use crate::capture::feed::{EventFeed, RawEvent};

pub const EVENT_TAPE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeEntry {
    pub seq: u64,
    pub ts_ms: u64,
    pub event: RawEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventTapeJsonlLine {
    Header {
        schema_version: u32,
        created_at_ms: u64,
    },
    Entry {
        entry: TapeEntry,
    },
}

#[derive(Debug, Clone)]
pub struct EventTape {
    pub schema_version: u32,
    pub created_at_ms: u64,
    pub entries: Vec<TapeEntry>,
}

impl EventTape {
    pub fn new() -> Self {
        Self {
            schema_version: EVENT_TAPE_SCHEMA_VERSION,
            created_at_ms: now_ms(),
            entries: Vec::new(),
        }
    }

    pub fn write_jsonl_to(&self, writer: &mut impl Write) -> io::Result<()> {
        let header = EventTapeJsonlLine::Header {
            schema_version: self.schema_version,
            created_at_ms: self.created_at_ms,
        };
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&header).map_err(io::Error::other)?
        )?;
        for entry in &self.entries {
            let line = EventTapeJsonlLine::Entry {
                entry: entry.clone(),
            };
            writeln!(
                writer,
                "{}",
                serde_json::to_string(&line).map_err(io::Error::other)?
            )?;
        }
        Ok(())
    }

    pub fn write_jsonl_to_path(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_jsonl_to(&mut writer)?;
        writer.flush()
    }

    pub fn read_jsonl_from_path(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut schema_version: Option<u32> = None;
        let mut created_at_ms: Option<u64> = None;
        let mut entries = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: EventTapeJsonlLine =
                serde_json::from_str(&line).map_err(|e| io::Error::other(format!("{e}")))?;
            match parsed {
                EventTapeJsonlLine::Header {
                    schema_version: v,
                    created_at_ms: t,
                } => {
                    if idx != 0 {
                        return Err(io::Error::other("tape header must be the first JSONL line"));
                    }
                    schema_version = Some(v);
                    created_at_ms = Some(t);
                }
                EventTapeJsonlLine::Entry { entry } => {
                    entries.push(entry);
                }
            }
        }

        let schema_version =
            schema_version.ok_or_else(|| io::Error::other("missing tape header"))?;
        let created_at_ms =
            created_at_ms.ok_or_else(|| io::Error::other("missing tape header timestamp"))?;

        Ok(Self {
            schema_version,
            created_at_ms,
            entries,
        })
    }

    /// Events in sequence order, ready to feed a capture session.
    pub fn into_events(mut self) -> Vec<RawEvent> {
        self.entries.sort_by_key(|e| e.seq);
        self.entries.into_iter().map(|e| e.event).collect()
    }
}

impl Default for EventTape {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental tape writer used while a live capture is running.
pub struct EventTapeWriter {
    schema_version: u32,
    created_at_ms: u64,
    seq: AtomicU64,
    writer: Mutex<BufWriter<File>>,
}

impl EventTapeWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let created_at_ms = now_ms();
        let header = EventTapeJsonlLine::Header {
            schema_version: EVENT_TAPE_SCHEMA_VERSION,
            created_at_ms,
        };
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&header).map_err(io::Error::other)?
        )?;
        writer.flush()?;
        Ok(Self {
            schema_version: EVENT_TAPE_SCHEMA_VERSION,
            created_at_ms,
            seq: AtomicU64::new(1),
            writer: Mutex::new(writer),
        })
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn append(&self, event: RawEvent) -> io::Result<()> {
        let entry = TapeEntry {
            seq: self.next_seq(),
            ts_ms: now_ms(),
            event,
        };
        let line = EventTapeJsonlLine::Entry { entry };
        let json = serde_json::to_string(&line).map_err(io::Error::other)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{json}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Feed that replays a loaded tape in sequence order.
pub struct TapeFeed {
    events: VecDeque<RawEvent>,
}

impl TapeFeed {
    pub fn new(tape: EventTape) -> Self {
        Self {
            events: tape.into_events().into(),
        }
    }
}

#[async_trait]
impl EventFeed for TapeFeed {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, FeedError> {
        Ok(self.events.pop_front())
    }
}

/// Feed wrapper that tees every delivered event onto a tape, so a live
/// capture can be re-run offline later. Tape write failures are logged,
/// never surfaced to the capture path.
pub struct RecordingFeed<F> {
    inner: F,
    writer: std::sync::Arc<EventTapeWriter>,
}

impl<F: EventFeed> RecordingFeed<F> {
    pub fn new(inner: F, writer: std::sync::Arc<EventTapeWriter>) -> Self {
        Self { inner, writer }
    }
}

#[async_trait]
impl<F: EventFeed> EventFeed for RecordingFeed<F> {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, FeedError> {
        let event = self.inner.next_event().await?;
        if let Some(event) = &event {
            if let Err(err) = self.writer.append(event.clone()) {
                tracing::debug!(error = %err, "failed to append event to tape");
            }
        }
        Ok(event)
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
