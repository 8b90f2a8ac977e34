//! Sony connection delegate
//!
//! Sony bodies need a session before they accept location packets: subscribe
//! to the status channel, lock and enable location transfer, then probe the
//! diagnostic characteristics that pick the packet variant. The session lives
//! until teardown, which cancels its background tasks and writes disable and
//! unlock.

use crate::domain::location::GpsLocation;
use crate::error::{SyncError, SyncResult};
use crate::infrastructure::bluetooth::connection::{
    cancelled, resolve, write_with_retry, ConnectionDelegate, DelegateConfig,
};
use crate::infrastructure::bluetooth::gatt::{GattEndpoint, GattFeature};
use crate::infrastructure::bluetooth::protocol::sony::{self, SonyCodec};
use crate::infrastructure::bluetooth::protocol::ProtocolCodec;
use crate::infrastructure::bluetooth::session::{
    record_sent, spawn_status_observer, KeepAlive, LastSent, PhaseTracker, SessionPhase,
};
use crate::infrastructure::bluetooth::transport::GattLink;
use crate::infrastructure::bluetooth::vendor::Vendor;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Results of the one-time diagnostic reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityProbe {
    pub time_correction: Option<Vec<u8>>,
    pub area_adjustment: Option<Vec<u8>>,
    /// `true` selects the 95-byte location packet
    pub include_time_zone: bool,
}

/// Background tasks owned by a session. Dropping the set aborts them.
#[derive(Default)]
struct SessionTasks(Vec<JoinHandle<()>>);

impl SessionTasks {
    fn push(&mut self, task: JoinHandle<()>) {
        self.0.push(task);
    }

    fn abort_all(&self) {
        self.0.iter().for_each(JoinHandle::abort);
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// State created when enabling completes, dropped on teardown.
struct SonySession {
    codec: SonyCodec,
    probe: CapabilityProbe,
    /// Lock/enable were written and must be undone
    locked: bool,
    tasks: SessionTasks,
}

pub struct SonyConnectionDelegate {
    config: DelegateConfig,
    phase: PhaseTracker,
    session: Mutex<Option<SonySession>>,
    last_sent: LastSent,
    cancel_tx: watch::Sender<bool>,
}

impl SonyConnectionDelegate {
    pub fn new(config: DelegateConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            config,
            phase: PhaseTracker::default(),
            session: Mutex::new(None),
            last_sent: LastSent::default(),
            cancel_tx,
        }
    }

    /// Probe results, once the session is enabled.
    pub async fn capability_probe(&self) -> Option<CapabilityProbe> {
        self.session.lock().await.as_ref().map(|s| s.probe.clone())
    }

    /// Run the enable sequence unless this connection already has.
    ///
    /// Holding the session lock for the whole sequence makes concurrent first
    /// syncs wait for one enable instead of racing their own. Once teardown
    /// has started no new session is created.
    async fn ensure_enabled(&self, link: &GattLink) -> SyncResult<SonyCodec> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.codec);
        }

        let mut cancel = self.cancel_tx.subscribe();
        if *cancel.borrow() {
            debug!("Sony connection is tearing down, not enabling");
            return Err(SyncError::Cancelled);
        }

        self.phase.set(SessionPhase::Enabling);
        match self.enable(link, &mut cancel).await {
            Ok(enabled) => {
                let codec = enabled.codec;
                *session = Some(enabled);
                self.phase.set(SessionPhase::Enabled);
                Ok(codec)
            }
            Err(SyncError::Cancelled) => {
                info!("Sony enable sequence cancelled");
                self.phase.set(SessionPhase::Connected);
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                warn!("Sony enable sequence failed: {}", e);
                self.phase.set(SessionPhase::Connected);
                Err(e)
            }
        }
    }

    /// Each GATT step races the cancel signal. Tasks spawned before a failure
    /// are aborted when `tasks` drops.
    async fn enable(
        &self,
        link: &GattLink,
        cancel: &mut watch::Receiver<bool>,
    ) -> SyncResult<SonySession> {
        let mut tasks = SessionTasks::default();
        let lock_endpoints = self.lock_endpoints(link);

        if let Some((lock, enable)) = lock_endpoints {
            if let Ok(status) = resolve(link, Vendor::Sony, GattFeature::LocationStatus) {
                let subscribed = tokio::select! {
                    biased;
                    _ = cancelled(cancel) => Err(SyncError::Cancelled),
                    result = link.subscribe(status) => result,
                };
                match subscribed {
                    Ok(rx) => tasks.push(spawn_status_observer(rx)),
                    Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                    Err(e) => warn!("Location status subscription failed: {}", e),
                }
            }

            let locked = async {
                link.write(lock, &sony::LOCK).await?;
                debug!("Location transfer locked");
                link.write(enable, &sony::ENABLE).await?;
                debug!("Location transfer enabled");
                Ok::<_, SyncError>(())
            };
            tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(SyncError::Cancelled),
                result = locked => result?,
            }
        } else {
            info!("No location lock on this body, skipping lock/enable");
        }

        let probe = self.probe(link, cancel).await?;
        let codec = SonyCodec::new(probe.include_time_zone);
        info!(
            "Sony session enabled, {}-byte location packets",
            codec.location_len()
        );

        match resolve(link, Vendor::Sony, GattFeature::Location) {
            Ok(endpoint) => {
                let keep_alive = KeepAlive {
                    link: link.clone(),
                    endpoint,
                    codec: Arc::new(codec),
                    last_sent: self.last_sent.clone(),
                    period: self.config.keep_alive_period,
                    time_zone: self.config.time_zone,
                    clock: self.config.clock.clone(),
                };
                tasks.push(keep_alive.spawn());
            }
            Err(e) => debug!("No keep-alive: {}", e),
        }

        Ok(SonySession {
            codec,
            probe,
            locked: lock_endpoints.is_some(),
            tasks,
        })
    }

    /// Lock and enable endpoints if the table defines them and the body has both.
    fn lock_endpoints(&self, link: &GattLink) -> Option<(GattEndpoint, GattEndpoint)> {
        if !Vendor::Sony.gatt_spec().has_location_lock() {
            return None;
        }
        let lock = resolve(link, Vendor::Sony, GattFeature::LocationLock).ok()?;
        let enable = resolve(link, Vendor::Sony, GattFeature::LocationEnable).ok()?;
        Some((lock, enable))
    }

    /// Read failures are tolerated as `None`; only cancellation is an error.
    async fn probe_read(
        &self,
        link: &GattLink,
        feature: GattFeature,
        cancel: &mut watch::Receiver<bool>,
    ) -> SyncResult<Option<Vec<u8>>> {
        let endpoint = match resolve(link, Vendor::Sony, feature) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("Probe read of {} skipped: {}", feature, e);
                return Ok(None);
            }
        };
        let result = tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(SyncError::Cancelled),
            result = link.read(endpoint) => result,
        };
        match result {
            Ok(value) => {
                debug!("Probe {}: {:02X?}", feature, value);
                Ok(Some(value))
            }
            Err(SyncError::Cancelled) => Err(SyncError::Cancelled),
            Err(e) => {
                warn!("Probe read of {} failed: {}", feature, e);
                Ok(None)
            }
        }
    }

    async fn probe(
        &self,
        link: &GattLink,
        cancel: &mut watch::Receiver<bool>,
    ) -> SyncResult<CapabilityProbe> {
        let time_correction = self
            .probe_read(link, GattFeature::TimeCorrection, cancel)
            .await?;
        let area_adjustment = self
            .probe_read(link, GattFeature::AreaAdjustment, cancel)
            .await?;
        let include_time_zone = self
            .probe_read(link, GattFeature::LocationConfig, cancel)
            .await?
            .and_then(|blob| sony::time_zone_support_from_config(&blob))
            .unwrap_or(SonyCodec::DEFAULT.include_time_zone);

        Ok(CapabilityProbe {
            time_correction,
            area_adjustment,
            include_time_zone,
        })
    }

    async fn write_synced(
        &self,
        link: &GattLink,
        endpoint: GattEndpoint,
        payload: &[u8],
    ) -> SyncResult<()> {
        let _syncing = self.phase.begin_sync();
        write_with_retry(
            link,
            endpoint,
            payload,
            self.config.max_attempts,
            self.config.retry_delay,
            self.cancel_tx.subscribe(),
        )
        .await
    }
}

#[async_trait]
impl ConnectionDelegate for SonyConnectionDelegate {
    fn vendor(&self) -> Vendor {
        Vendor::Sony
    }

    fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    async fn on_connected(&self, _link: &GattLink) -> SyncResult<()> {
        self.cancel_tx.send_replace(false);
        self.phase.set(SessionPhase::Connected);
        Ok(())
    }

    async fn sync_location(&self, link: &GattLink, location: &GpsLocation) -> SyncResult<()> {
        let endpoint = resolve(link, Vendor::Sony, GattFeature::Location)?;
        let codec = self.ensure_enabled(link).await?;

        let payload = codec.encode_location(location, self.config.time_zone);
        debug!("Sony location packet ({} bytes)", payload.len());
        self.write_synced(link, endpoint, &payload).await?;
        record_sent(&self.last_sent, location);
        Ok(())
    }

    async fn sync_date_time(&self, link: &GattLink, date_time: &DateTime<Tz>) -> SyncResult<()> {
        let endpoint = resolve(link, Vendor::Sony, GattFeature::DateTime)?;
        let codec = self.ensure_enabled(link).await?;

        let payload = codec.encode_date_time(date_time);
        self.write_synced(link, endpoint, &payload).await
    }

    async fn on_disconnecting(&self, link: &GattLink) {
        self.cancel_tx.send_replace(true);

        let Some(session) = self.session.lock().await.take() else {
            self.phase.set(SessionPhase::Disconnected);
            return;
        };

        self.phase.set(SessionPhase::Disconnecting);
        session.tasks.abort_all();
        if let Ok(mut last) = self.last_sent.lock() {
            *last = None;
        }

        if session.locked {
            if let Some((lock, enable)) = self.lock_endpoints(link) {
                if let Err(e) = link.write(enable, &sony::DISABLE).await {
                    warn!("Disable write failed during teardown: {}", e);
                }
                if let Err(e) = link.write(lock, &sony::UNLOCK).await {
                    warn!("Unlock write failed during teardown: {}", e);
                }
            }
        }

        info!("Sony session closed");
        self.phase.set(SessionPhase::Disconnected);
    }
}
