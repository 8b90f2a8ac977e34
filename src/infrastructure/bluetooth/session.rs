//! Per-connection session state shared by the delegates
//!
//! ```text
//! Disconnected -> Connected -> Enabling -> Enabled <-> Syncing
//!                                              |
//!                                        Disconnecting -> Disconnected
//! ```

use crate::domain::clock::Clock;
use crate::domain::location::GpsLocation;
use crate::infrastructure::bluetooth::gatt::GattEndpoint;
use crate::infrastructure::bluetooth::protocol::ProtocolCodec;
use crate::infrastructure::bluetooth::transport::GattLink;
use chrono_tz::Tz;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    /// Connected, vendor enable sequence not yet run
    Connected,
    Enabling,
    Enabled,
    /// Enabled with at least one sync write in flight
    Syncing,
    Disconnecting,
}

/// Tracks the lifecycle phase plus the number of in-flight syncs.
#[derive(Debug)]
pub struct PhaseTracker {
    phase: Mutex<SessionPhase>,
    in_flight: AtomicUsize,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            phase: Mutex::new(SessionPhase::Disconnected),
            in_flight: AtomicUsize::new(0),
        }
    }
}

impl PhaseTracker {
    pub fn get(&self) -> SessionPhase {
        let phase = self.phase.lock().map(|p| *p).unwrap_or(SessionPhase::Disconnected);
        if phase == SessionPhase::Enabled && self.in_flight.load(Ordering::SeqCst) > 0 {
            SessionPhase::Syncing
        } else {
            phase
        }
    }

    pub fn set(&self, phase: SessionPhase) {
        if let Ok(mut current) = self.phase.lock() {
            if *current != phase {
                debug!("Session phase {:?} -> {:?}", *current, phase);
                *current = phase;
            }
        }
    }

    /// Connected -> Enabled for vendors with nothing to enable.
    pub fn enable_trivially(&self) {
        if let Ok(mut current) = self.phase.lock() {
            if *current == SessionPhase::Connected {
                *current = SessionPhase::Enabled;
            }
        }
    }

    /// Mark a sync as in flight until the guard drops.
    pub fn begin_sync(&self) -> SyncGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        SyncGuard { tracker: self }
    }
}

pub struct SyncGuard<'a> {
    tracker: &'a PhaseTracker,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The last location the camera acknowledged.
#[derive(Debug, Clone)]
pub struct SentLocation {
    pub location: GpsLocation,
    pub sent_at: Instant,
}

pub type LastSent = Arc<Mutex<Option<SentLocation>>>;

pub fn record_sent(last_sent: &LastSent, location: &GpsLocation) {
    if let Ok(mut guard) = last_sent.lock() {
        *guard = Some(SentLocation {
            location: location.clone(),
            sent_at: Instant::now(),
        });
    }
}

/// Everything the keep-alive task needs, detached from the delegate.
pub struct KeepAlive {
    pub link: GattLink,
    pub endpoint: GattEndpoint,
    pub codec: Arc<dyn ProtocolCodec>,
    pub last_sent: LastSent,
    pub period: Duration,
    pub time_zone: Tz,
    pub clock: Arc<dyn Clock>,
}

impl KeepAlive {
    /// Location to re-send if nothing was sent within the last period.
    fn due(&self) -> Option<GpsLocation> {
        let guard = self.last_sent.lock().ok()?;
        guard
            .as_ref()
            .filter(|sent| sent.sent_at.elapsed() >= self.period)
            .map(|sent| sent.location.clone())
    }

    /// Re-send the last location with a fresh timestamp every `period` while
    /// no organic update has gone out. Shares the link's write queue.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Location keep-alive started ({:?})", self.period);

            loop {
                ticker.tick().await;
                let Some(location) = self.due() else {
                    continue;
                };

                let refreshed = location.with_fresh_timestamp(self.clock.now());
                let payload = self.codec.encode_location(&refreshed, self.time_zone);
                match self.link.write(self.endpoint, &payload).await {
                    Ok(()) => {
                        debug!("Keep-alive re-sent location stamped {}", refreshed.timestamp);
                        record_sent(&self.last_sent, &refreshed);
                    }
                    Err(e) => warn!("Keep-alive write failed: {}", e),
                }
            }
        })
    }
}

/// Drain a status notification stream for the connection's lifetime.
pub fn spawn_status_observer(mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            debug!("Location status notification: {:02X?}", value);
        }
        debug!("Location status stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syncing_is_derived_from_in_flight_count() {
        let tracker = PhaseTracker::default();
        tracker.set(SessionPhase::Connected);
        tracker.enable_trivially();
        assert_eq!(tracker.get(), SessionPhase::Enabled);

        {
            let _a = tracker.begin_sync();
            let _b = tracker.begin_sync();
            assert_eq!(tracker.get(), SessionPhase::Syncing);
        }
        assert_eq!(tracker.get(), SessionPhase::Enabled);
    }

    #[test]
    fn test_trivial_enable_only_from_connected() {
        let tracker = PhaseTracker::default();
        tracker.enable_trivially();
        assert_eq!(tracker.get(), SessionPhase::Disconnected);
    }
}
