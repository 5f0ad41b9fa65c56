//! Hardware-independent core of the AHT20 MQTT sensor firmware.
//!
//! Everything here is generic over `embedded-hal`/`embedded-storage` traits or
//! small capability traits, so it builds for the ESP32 and runs its tests on
//! the host.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

pub mod config;
pub mod constants;
pub mod payload;
pub mod portal;
pub mod provisioning;
pub mod publisher;
pub mod schedule;
pub mod sensors;
pub mod store;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{DeviceConfig, Field, WifiCredentials};
pub use provisioning::{BootAction, Provisioner, Trigger};
pub use publisher::{Publisher, PublishOutcome};
pub use sensors::{Reading, Sensor, SensorError};
pub use store::ConfigStore;
