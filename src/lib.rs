//! BLE location and time sync for cameras.
//!
//! Identify a camera from its advertisement, hand its GATT transport to
//! [`CameraSyncService`], then push locations and wall-clock time to it.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{SyncError, SyncResult};
pub use infrastructure::bluetooth::CameraSyncService;
