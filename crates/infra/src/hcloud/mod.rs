//! Hetzner Cloud adapter

pub mod client;
pub mod driver;
pub mod types;

pub use client::HcloudClient;
pub use driver::{label_selector, phase_for_status, HcloudDriver, ProvisionSettings};
