//! Bluetooth Module
//!
//! Emulates a Nuimo controller as a BLE GATT peripheral.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     EmulatorService                       │
//! │  (Owns the task, public API through EmulatorHandle)       │
//! └──────────────┬─────────────────────────────▲─────────────┘
//!                │ commands                    │ TransportEvent
//!                ▼                             │
//! ┌──────────────────────────┐   calls  ┌──────┴─────────────┐
//! │        Peripheral        │─────────▶│   GattTransport    │
//! │                          │          │                    │
//! │ - Power / advertising    │          │ - Advertiser       │
//! │ - Connection tracking    │          │ - GATT server      │
//! │ - Subscriptions, input   │          │ - SimulatedRadio   │
//! └──────────────────────────┘          └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Capability trait over the host BLE stack
//! - [`peripheral`] - Connection and advertising state machine
//! - [`service`] - Task wrapper and cloneable handle
//! - [`simulated`] - In-process transport used by the shell and tests

pub mod peripheral;
pub mod service;
pub mod simulated;
pub mod transport;

// Re-export main service for convenience
pub use service::{transport_channel, EmulatorHandle, EmulatorService};
