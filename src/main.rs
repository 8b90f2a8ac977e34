//! Dry-run sync session against a simulated Sony camera.

use camera_sync::domain::location::GpsLocation;
use camera_sync::domain::models::AppEvent;
use camera_sync::domain::settings::SettingsService;
use camera_sync::infrastructure::bluetooth::connection::DelegateConfig;
use camera_sync::infrastructure::bluetooth::gatt::GattFeature;
use camera_sync::infrastructure::bluetooth::protocol::sony;
use camera_sync::infrastructure::bluetooth::registry::VendorRegistry;
use camera_sync::infrastructure::bluetooth::scanner::{Advertisement, BleScanner};
use camera_sync::infrastructure::bluetooth::simulated::{GattOp, SimulatedPeripheral};
use camera_sync::infrastructure::bluetooth::CameraSyncService;
use camera_sync::infrastructure::logging;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Keep-alive period for the dry run, so a re-send shows up quickly.
const DRY_RUN_KEEP_ALIVE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = SettingsService::new()?;
    let _log_guard = logging::init_logger(&settings.get().log_settings)?;
    info!("Starting camera sync dry run");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(VendorRegistry::default());

    let config = DelegateConfig {
        keep_alive_period: DRY_RUN_KEEP_ALIVE,
        ..DelegateConfig::from_settings(&settings.get().sync)?
    };
    let service =
        CameraSyncService::new(registry.clone(), config).with_event_sender(event_tx.clone());

    let mut scanner = BleScanner::new(registry, event_tx);
    let filter = scanner.start();
    info!("Scan filter: {:?}", filter);

    let advertisement = Advertisement {
        address: "D8:3A:DD:4F:10:22".to_string(),
        name: Some("ILCE-7M4".to_string()),
        service_uuids: vec![sony::REMOTE_SERVICE_UUID],
        manufacturer_data: HashMap::from([(sony::COMPANY_ID, vec![0x03, 0x00, 0x65, 0x00])]),
        rssi: Some(-58),
    };
    let Some(camera) = scanner.handle_advertisement(&advertisement) else {
        anyhow::bail!("Simulated advertisement was not recognised");
    };
    scanner.stop();

    let peripheral = Arc::new(SimulatedPeripheral::from_spec(&sony::GATT_SPEC));
    peripheral.set_value(sony::LOCATION_CONFIG_CHAR_UUID, vec![0x00, 0x00, 0x00, 0x00, 0x02]);
    peripheral.set_value(
        camera_sync::infrastructure::bluetooth::gatt::FIRMWARE_REVISION_CHAR,
        b"2.00".to_vec(),
    );

    service.on_connected(camera.clone(), peripheral.clone()).await?;

    match service
        .read_device_string(&camera, GattFeature::FirmwareVersion)
        .await
    {
        Ok(version) => info!("Firmware {}", version),
        Err(e) => warn!("Firmware read failed: {}", e),
    }

    service.sync_current_time(&camera).await?;

    let location = GpsLocation::new(35.6586, 139.7454, 40.0, 5.0, Utc::now());
    service.sync_location(&camera, &location).await?;

    info!("Waiting for a keep-alive re-send");
    tokio::time::sleep(DRY_RUN_KEEP_ALIVE * 2 + Duration::from_millis(200)).await;

    service.on_disconnecting(&camera).await;

    for op in peripheral.ops() {
        match op {
            GattOp::Write {
                characteristic,
                value,
            } => info!(
                "WRITE {} [{}] {}",
                characteristic,
                value.len(),
                hex::encode_upper(&value)
            ),
            GattOp::Read { characteristic } => info!("READ  {}", characteristic),
            GattOp::Subscribe { characteristic } => info!("SUB   {}", characteristic),
        }
    }

    while let Ok(event) = event_rx.try_recv() {
        match event {
            AppEvent::LogMessage(msg) => info!("[{:?}] {}", msg.severity, msg.message),
            other => info!("Event: {:?}", other),
        }
    }

    Ok(())
}
