//! Access to live devices: fetching running configuration, pushing
//! configuration lines and saving.
//!
//! The reconciler only sees the `DeviceAccess` trait; failures are passed
//! through as-is, never retried.

pub mod ssh;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CommandSet, ConfigText, ConnectionParams};

pub use ssh::SshDeviceAccess;

#[async_trait]
pub trait DeviceAccess: Send + Sync {
    /// Fetch the configuration currently active on the device.
    /// Unreachable devices and failed logins are `Error::Connectivity`.
    async fn fetch_running_config(&self, params: &ConnectionParams) -> Result<ConfigText>;

    /// Apply `commands` as one configuration session, returning the device output.
    /// Rejected commands are `Error::PushFailure`.
    async fn push_commands(&self, params: &ConnectionParams, commands: &CommandSet) -> Result<String>;

    /// Persist the running configuration on the device
    async fn save_config(&self, params: &ConnectionParams) -> Result<String>;
}
