//! Ports: traits the control plane consumes, implemented by adapters.

pub mod client_driver;

pub use client_driver::{ClientDriver, ConnectCredentials, DriverEvent, EntityFilter, Face, Hand};
