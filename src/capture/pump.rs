//! Drives a capture session from a feed through a bounded queue.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::capture::error::{CaptureError, FeedError};
use crate::capture::feed::{EventFeed, RawEvent};
use crate::capture::session::{CaptureConfig, CaptureSession};
use crate::trace::model::Trace;

/// Pump events from `feed` into `session` until the feed is exhausted,
/// then freeze and return the trace.
///
/// The queue is bounded by `config.queue_capacity`: when the session falls
/// behind, backpressure lands on the feed side of the channel, not on the
/// instrumented target. Cancellation is honored between events; events
/// arriving after cancellation are dropped.
pub async fn run_capture<F>(
    mut feed: F,
    mut session: CaptureSession,
    config: &CaptureConfig,
    cancel: CancellationToken,
) -> Result<Trace, CaptureError>
where
    F: EventFeed + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Result<RawEvent, FeedError>>(config.queue_capacity);

    let producer = tokio::spawn(async move {
        loop {
            match feed.next_event().await {
                Ok(Some(event)) => {
                    if tx.send(Ok(event)).await.is_err() {
                        // Consumer gone (cancelled), stop pulling from the feed.
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            }
        }
    });

    let mut feed_error: Option<FeedError> = None;
    while let Some(item) = rx.recv().await {
        if cancel.is_cancelled() {
            tracing::info!(session = %session.session_id(), "capture cancelled");
            session.cancel();
            break;
        }
        match item {
            Ok(event) => session.on_event(event),
            Err(err) => {
                feed_error = Some(err);
                break;
            }
        }
    }
    drop(rx);

    let _ = producer.await;

    match feed_error {
        Some(err) => Err(CaptureError::Feed(err)),
        None => Ok(session.end()),
    }
}
