use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// DeviceRecord represents one entry of the device inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub hostname: String,
    /// Selects the template used to render this device
    pub role: String,
    pub mgmt_ip: String,
    /// Any further inventory attributes, passed through to templates
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceRecord {
    pub fn new(hostname: &str, role: &str, mgmt_ip: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            role: role.to_string(),
            mgmt_ip: mgmt_ip.to_string(),
            extra: Map::new(),
        }
    }
}

/// Inventory file layout: `devices:` followed by a list of records
#[derive(Debug, Clone, Deserialize)]
pub struct Inventory {
    pub devices: Vec<DeviceRecord>,
}

/// Connection details for one device session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub hostname: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionParams {
    pub fn for_device(device: &DeviceRecord, port: u16) -> Self {
        Self {
            hostname: device.hostname.clone(),
            host: device.mgmt_ip.clone(),
            port,
        }
    }
}
