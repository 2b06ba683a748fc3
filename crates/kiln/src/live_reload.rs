//! Server-sent reload notifications.
//!
//! Each connection remembers the snapshot that was current when it
//! connected and polls the coordinator for a newer one. Polling keeps the
//! coordinator free of per-connection bookkeeping; comparing two ids is cheap
//! enough to do every few milliseconds.

use crate::coordinator::BuildCoordinator;
use crate::shutdown::Shutdown;
use crate::snapshot::SnapshotId;
use axum::response::sse::Event;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::Stream;

/// How often a connection checks for a new snapshot.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How often an idle connection sends a keep-alive message.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Data of the message that tells the client to reload.
pub const RELOAD: &str = "reload";

/// Data of the keep-alive message.
pub const PING: &str = "p";

/// Per-connection view of the published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveReloadSession {
    last_seen: Option<SnapshotId>,
}

impl LiveReloadSession {
    pub fn new(last_seen: Option<SnapshotId>) -> Self {
        Self { last_seen }
    }

    /// Record `current`; returns whether it differs from what was last seen.
    pub fn observe(&mut self, current: Option<SnapshotId>) -> bool {
        if current == self.last_seen {
            return false;
        }
        self.last_seen = current;
        true
    }
}

enum Tick {
    Poll,
    KeepAlive,
    Shutdown,
}

/// Event stream for one live-reload connection.
///
/// The stream ends when `shutdown` fires. If the client goes away the
/// server drops the stream, which stops the loop.
pub fn events(
    coordinator: Arc<BuildCoordinator>,
    shutdown: Shutdown,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    events_with(coordinator, shutdown, POLL_INTERVAL, KEEP_ALIVE_INTERVAL)
}

pub(crate) fn events_with(
    coordinator: Arc<BuildCoordinator>,
    shutdown: Shutdown,
    poll_every: Duration,
    keep_alive_every: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut session = LiveReloadSession::new(coordinator.current_id());
        tracing::debug!(last_seen = ?session.last_seen, "Live-reload client connected");

        let mut poll = tokio::time::interval_at(Instant::now() + poll_every, poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut keep_alive =
            tokio::time::interval_at(Instant::now() + keep_alive_every, keep_alive_every);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = tokio::select! {
                _ = shutdown.wait() => Tick::Shutdown,
                _ = poll.tick() => Tick::Poll,
                _ = keep_alive.tick() => Tick::KeepAlive,
            };

            match tick {
                Tick::Shutdown => break,
                Tick::Poll => {
                    if session.observe(coordinator.current_id()) {
                        tracing::debug!(snapshot = ?session.last_seen, "Sending reload");
                        yield Ok(Event::default().data(RELOAD));
                    }
                }
                Tick::KeepAlive => yield Ok(Event::default().data(PING)),
            }
        }

        tracing::debug!("Live-reload stream closed");
    }
}
