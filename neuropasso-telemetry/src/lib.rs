//! Leg-node telemetry for NeuroPasso
//!
//! Decodes the datagrams streamed by the wearable leg nodes and keeps the
//! latest reading for each node.
//!
//! # Wire Format
//!
//! One ASCII frame per UDP datagram: `<deviceId>,<angle>,<emg>,<ecg>`, e.g.
//! `ESQ,45.5,120,300`. `ESQ` is the left leg and `DIR` the right leg.
//!
//! # Example Usage
//!
//! ```
//! use neuropasso_telemetry::{decode, DeviceStateStore};
//!
//! let store = DeviceStateStore::with_default_devices();
//! let reading = decode(b"ESQ,45.5,120,300").unwrap();
//! assert!(store.update(reading));
//! assert_eq!(store.snapshot("ESQ").unwrap().angle(), 45.5);
//! ```

pub mod decoder;
pub mod error;
pub mod reading;
pub mod state;
pub mod status;

// Re-exports
pub use decoder::{decode, decode_at};
pub use error::{DecodeError, Result};
pub use reading::{
    epoch_seconds, from_epoch_seconds, DeviceReading, DEFAULT_DEVICES, LEFT_LEG, RIGHT_LEG,
};
pub use state::DeviceStateStore;
pub use status::{DeviceStatus, DEFAULT_STALE_AFTER};
