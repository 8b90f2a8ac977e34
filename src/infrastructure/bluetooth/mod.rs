//! Bluetooth Module
//!
//! BLE control-plane engine for camera location and time sync.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CameraSyncService                      │
//! │  (Facade - one delegate per connected camera)            │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┐
//!         │             │              │
//!         ▼             ▼              ▼
//! ┌────────────┐  ┌─────────────┐  ┌──────────┐
//! │  Registry  │  │  Delegates  │  │ Protocol │
//! │            │  │             │  │          │
//! │ - identify │  │ - enable    │  │ - Ricoh  │
//! │ - filters  │  │ - retry     │  │ - Sony   │
//! │            │  │ - keep-alive│  │          │
//! └────────────┘  └──────┬──────┘  └──────────┘
//!                        ▼
//!                 ┌─────────────┐
//!                 │  GattLink   │
//!                 │ (1 writer,  │
//!                 │  timeouts)  │
//!                 └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`vendor`] - Supported vendors and their static data
//! - [`registry`] - Vendor identification from advertisements
//! - [`gatt`] - Per-vendor characteristic tables
//! - [`protocol`] - Wire codecs
//! - [`transport`] - Platform GATT contract and the serialized link
//! - [`connection`] - Delegate trait, retry and the default delegate
//! - [`sony_delegate`] - Session-based Sony delegate
//! - [`session`] - Phase tracking and keep-alive
//! - [`scanner`] - Advertisement handling
//! - [`service`] - Facade
//! - [`simulated`] - In-memory peripheral

pub mod connection;
pub mod gatt;
pub mod protocol;
pub mod registry;
pub mod scanner;
pub mod service;
pub mod session;
pub mod simulated;
pub mod sony_delegate;
pub mod transport;
pub mod vendor;

// Re-export main service for convenience
pub use service::CameraSyncService;
