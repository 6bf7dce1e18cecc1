//! Nuimo controller emulator.
//!
//! Presents the host as a Nuimo BLE peripheral: the GATT profile lives in
//! [`domain::profile`], wire formats in [`domain::codec`] and the
//! connection/advertising state machine in [`infrastructure::bluetooth`].

pub mod domain;
pub mod infrastructure;
