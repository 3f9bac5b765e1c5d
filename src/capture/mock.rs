//! Mock event feed for deterministic testing.
//!
//! Implements [`EventFeed`] to deliver pre-scripted probe events without a
//! live instrumented target. Use [`FeedScriptBuilder`] to assemble
//! well-formed (or deliberately malformed) event streams for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::capture::error::FeedError;
use crate::capture::feed::{EventFeed, RawError, RawEvent};
use crate::trace::record::{ActivationId, TargetId};
use crate::trace::value::{ValueIdentity, ValueShape, ValueSnapshot};

/// Shorthand for a snapshot with an explicit identity.
pub fn snap(identity: u64, shape: ValueShape) -> ValueSnapshot {
    ValueSnapshot::new(ValueIdentity(identity), shape)
}

/// Scripted feed delivering events in order, optionally ending in an error.
pub struct MockEventFeed {
    events: VecDeque<RawEvent>,
    event_delay: Duration,
    trailing_error: Option<FeedError>,
    delivered: Arc<AtomicUsize>,
}

impl MockEventFeed {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events: events.into(),
            event_delay: Duration::ZERO,
            trailing_error: None,
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay between events (simulates a live stream).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.event_delay = delay;
        self
    }

    /// Fail with `error` once the scripted events are exhausted.
    pub fn failing_with(mut self, error: FeedError) -> Self {
        self.trailing_error = Some(error);
        self
    }

    /// Counter of delivered events, for assertions after the feed is moved.
    pub fn delivered_counter(&self) -> Arc<AtomicUsize> {
        self.delivered.clone()
    }
}

#[async_trait]
impl EventFeed for MockEventFeed {
    async fn next_event(&mut self) -> Result<Option<RawEvent>, FeedError> {
        if !self.event_delay.is_zero() {
            tokio::time::sleep(self.event_delay).await;
        }
        match self.events.pop_front() {
            Some(event) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(Some(event))
            }
            None => match self.trailing_error.take() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }
}

/// Builder for probe-event scripts.
///
/// Events are emitted on the current activation (default `"main"`); switch
/// with [`FeedScriptBuilder::on_activation`].
pub struct FeedScriptBuilder {
    events: Vec<RawEvent>,
    activation: ActivationId,
}

impl FeedScriptBuilder {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            activation: ActivationId::from_string("main"),
        }
    }

    pub fn on_activation(mut self, id: &str) -> Self {
        self.activation = ActivationId::from_string(id);
        self
    }

    pub fn enter(self, name: &str, arguments: Vec<ValueSnapshot>) -> Self {
        self.enter_with(name, "()", None, arguments)
    }

    pub fn enter_with(
        mut self,
        name: &str,
        signature: &str,
        receiver: Option<ValueSnapshot>,
        arguments: Vec<ValueSnapshot>,
    ) -> Self {
        self.events.push(RawEvent::Enter {
            activation: self.activation.clone(),
            target: TargetId::new(name, signature),
            receiver,
            arguments,
        });
        self
    }

    pub fn exit_unit(mut self) -> Self {
        self.events.push(RawEvent::Exit {
            activation: self.activation.clone(),
            return_value: None,
        });
        self
    }

    pub fn exit_value(mut self, value: ValueSnapshot) -> Self {
        self.events.push(RawEvent::Exit {
            activation: self.activation.clone(),
            return_value: Some(value),
        });
        self
    }

    pub fn throw(self, kind: &str, message: Option<&str>) -> Self {
        self.throw_with_value(kind, message, None)
    }

    pub fn throw_with_value(
        mut self,
        kind: &str,
        message: Option<&str>,
        value: Option<ValueSnapshot>,
    ) -> Self {
        self.events.push(RawEvent::Throw {
            activation: self.activation.clone(),
            error: RawError {
                kind: kind.to_string(),
                message: message.map(str::to_string),
                value,
            },
        });
        self
    }

    /// Append a raw event verbatim (for malformed-stream scenarios).
    pub fn raw(mut self, event: RawEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn build(self) -> Vec<RawEvent> {
        self.events
    }

    pub fn into_feed(self) -> MockEventFeed {
        MockEventFeed::new(self.build())
    }
}

impl Default for FeedScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
