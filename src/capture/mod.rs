//! Capture session: consumes the raw instrumentation feed and builds a trace.

pub mod error;
pub mod feed;
pub mod mock;
pub mod pump;
pub mod session;
pub mod tape;

pub use error::{CaptureError, FeedError};
pub use feed::{EventFeed, JsonlEventFeed, RawError, RawEvent};
pub use pump::run_capture;
pub use session::{CaptureConfig, CaptureSession};
pub use tape::{
    EventTape, EventTapeWriter, RecordingFeed, TapeEntry, TapeFeed, EVENT_TAPE_SCHEMA_VERSION,
};
