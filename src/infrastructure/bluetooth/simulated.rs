//! Simulated peripheral
//!
//! An in-memory [`GattTransport`] that records every operation in order and
//! can be told to misbehave per characteristic. Backs the dry-run mode of the
//! binary and the engine's tests.

use crate::error::TransportError;
use crate::infrastructure::bluetooth::gatt::GattSpec;
use crate::infrastructure::bluetooth::transport::{
    DiscoveredService, GattTransport, TransportResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// One recorded GATT operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattOp {
    Write { characteristic: Uuid, value: Vec<u8> },
    Read { characteristic: Uuid },
    Subscribe { characteristic: Uuid },
}

impl GattOp {
    pub fn characteristic(&self) -> Uuid {
        match self {
            GattOp::Write { characteristic, .. }
            | GattOp::Read { characteristic }
            | GattOp::Subscribe { characteristic } => *characteristic,
        }
    }
}

/// Misbehaviour injected into an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Never completes; the link timeout fires
    Hang,
    /// Completes with a transport error
    Fail,
    /// Completes as cancelled
    Cancel,
}

#[derive(Debug, Clone, Copy)]
struct FaultRule {
    fault: Fault,
    /// `None` = every time
    remaining: Option<usize>,
}

impl FaultRule {
    fn take(&mut self) -> Option<Fault> {
        match self.remaining.as_mut() {
            None => Some(self.fault),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.fault)
            }
        }
    }
}

#[derive(Default)]
struct State {
    services: Vec<DiscoveredService>,
    ops: Vec<GattOp>,
    values: HashMap<Uuid, Vec<u8>>,
    write_faults: HashMap<Uuid, FaultRule>,
    read_faults: HashMap<Uuid, FaultRule>,
    subscribers: HashMap<Uuid, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    connected: bool,
}

pub struct SimulatedPeripheral {
    state: Mutex<State>,
}

impl SimulatedPeripheral {
    pub fn new(services: Vec<DiscoveredService>) -> Self {
        Self {
            state: Mutex::new(State {
                services,
                connected: true,
                ..Default::default()
            }),
        }
    }

    /// Peripheral exposing every endpoint in `spec`.
    pub fn from_spec(spec: &GattSpec) -> Self {
        let mut services: Vec<DiscoveredService> = Vec::new();
        for endpoint in spec.endpoints() {
            match services.iter_mut().find(|s| s.uuid == endpoint.service) {
                Some(service) => {
                    if !service.characteristics.contains(&endpoint.characteristic) {
                        service.characteristics.push(endpoint.characteristic);
                    }
                }
                None => services.push(DiscoveredService {
                    uuid: endpoint.service,
                    characteristics: vec![endpoint.characteristic],
                }),
            }
        }
        Self::new(services)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop a characteristic from the discovered directory.
    pub fn remove_characteristic(&self, characteristic: Uuid) {
        for service in self.state().services.iter_mut() {
            service.characteristics.retain(|c| *c != characteristic);
        }
    }

    pub fn set_value(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) {
        self.state().values.insert(characteristic, value.into());
    }

    pub fn value(&self, characteristic: Uuid) -> Option<Vec<u8>> {
        self.state().values.get(&characteristic).cloned()
    }

    pub fn fail_writes(&self, characteristic: Uuid, fault: Fault, times: Option<usize>) {
        self.state().write_faults.insert(
            characteristic,
            FaultRule {
                fault,
                remaining: times,
            },
        );
    }

    pub fn fail_reads(&self, characteristic: Uuid, fault: Fault) {
        self.state().read_faults.insert(
            characteristic,
            FaultRule {
                fault,
                remaining: None,
            },
        );
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.write_faults.clear();
        state.read_faults.clear();
    }

    /// Push a notification to every subscriber of `characteristic`.
    pub fn notify(&self, characteristic: Uuid, value: &[u8]) -> usize {
        let mut state = self.state();
        let Some(senders) = state.subscribers.get_mut(&characteristic) else {
            return 0;
        };
        senders.retain(|tx| tx.send(value.to_vec()).is_ok());
        senders.len()
    }

    /// Every operation so far, in issue order.
    pub fn ops(&self) -> Vec<GattOp> {
        self.state().ops.clone()
    }

    /// Values written to `characteristic`, including failed attempts.
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                GattOp::Write {
                    characteristic: c,
                    value,
                } if *c == characteristic => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Subsequent operations fail as if the radio link dropped.
    pub fn disconnect(&self) {
        let mut state = self.state();
        state.connected = false;
        state.subscribers.clear();
    }

    async fn apply(fault: Option<Fault>) -> TransportResult<()> {
        match fault {
            None => Ok(()),
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Fail) => Err(TransportError::Failed("injected fault".to_string())),
            Some(Fault::Cancel) => Err(TransportError::Cancelled),
        }
    }
}

#[async_trait]
impl GattTransport for SimulatedPeripheral {
    fn services(&self) -> Vec<DiscoveredService> {
        self.state().services.clone()
    }

    async fn write(
        &self,
        _service: Uuid,
        characteristic: Uuid,
        value: &[u8],
    ) -> TransportResult<()> {
        let fault = {
            let mut state = self.state();
            state.ops.push(GattOp::Write {
                characteristic,
                value: value.to_vec(),
            });
            if !state.connected {
                return Err(TransportError::Disconnected);
            }
            state
                .write_faults
                .get_mut(&characteristic)
                .and_then(FaultRule::take)
        };

        Self::apply(fault).await?;
        debug!("Simulated write {} <- {:02X?}", characteristic, value);
        self.state().values.insert(characteristic, value.to_vec());
        Ok(())
    }

    async fn read(&self, _service: Uuid, characteristic: Uuid) -> TransportResult<Vec<u8>> {
        let fault = {
            let mut state = self.state();
            state.ops.push(GattOp::Read { characteristic });
            if !state.connected {
                return Err(TransportError::Disconnected);
            }
            state
                .read_faults
                .get_mut(&characteristic)
                .and_then(FaultRule::take)
        };

        Self::apply(fault).await?;
        Ok(self
            .state()
            .values
            .get(&characteristic)
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe(
        &self,
        _service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut state = self.state();
        state.ops.push(GattOp::Subscribe { characteristic });
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.entry(characteristic).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::sony;

    #[tokio::test]
    async fn test_records_ops_and_limited_faults() {
        let peripheral = SimulatedPeripheral::from_spec(&sony::GATT_SPEC);
        let ch = sony::LOCATION_CHAR_UUID;
        peripheral.fail_writes(ch, Fault::Fail, Some(1));

        let svc = sony::LOCATION_SERVICE_UUID;
        assert!(peripheral.write(svc, ch, &[1]).await.is_err());
        assert!(peripheral.write(svc, ch, &[2]).await.is_ok());
        assert_eq!(peripheral.writes_to(ch), vec![vec![1], vec![2]]);
        assert_eq!(peripheral.value(ch), Some(vec![2]));
    }

    #[tokio::test]
    async fn test_notifications_reach_subscribers() {
        let peripheral = SimulatedPeripheral::from_spec(&sony::GATT_SPEC);
        let ch = sony::LOCATION_STATUS_CHAR_UUID;
        let mut rx = peripheral
            .subscribe(sony::LOCATION_SERVICE_UUID, ch)
            .await
            .unwrap();

        assert_eq!(peripheral.notify(ch, &[0x03, 0x01]), 1);
        assert_eq!(rx.recv().await, Some(vec![0x03, 0x01]));
    }

    #[tokio::test]
    async fn test_disconnect_fails_further_ops() {
        let peripheral = SimulatedPeripheral::from_spec(&sony::GATT_SPEC);
        peripheral.disconnect();
        assert_eq!(
            peripheral
                .read(sony::LOCATION_SERVICE_UUID, sony::LOCATION_CONFIG_CHAR_UUID)
                .await,
            Err(TransportError::Disconnected)
        );
    }
}
