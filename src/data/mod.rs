//! Structured data shared by a render pass: device inventory, fabric
//! topology and the VLAN table.
//!
//! Everything is loaded and cross-checked once per invocation and is
//! read-only afterwards.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{DeviceRecord, Inventory, VlanRow};
use crate::utils::{is_valid_hostname, is_valid_mgmt_address};

/// FabricTopology is the global fabric document, guaranteed to be a mapping
/// with an `underlay_links` sequence
#[derive(Debug, Clone, PartialEq)]
pub struct FabricTopology(Value);

impl FabricTopology {
    pub fn new(value: Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| Error::data_format("fabric.yml", "top level must be a mapping"))?;
        match map.get("underlay_links") {
            None => return Err(Error::not_found("fabric key", "underlay_links")),
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(Error::data_format(
                    "fabric.yml",
                    "underlay_links must be a sequence",
                ))
            }
        }
        Ok(Self(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn underlay_links(&self) -> &Value {
        // Presence checked in new()
        &self.0["underlay_links"]
    }
}

/// All inputs of a render pass, validated against each other
#[derive(Debug, Clone)]
pub struct FabricData {
    pub devices: Vec<DeviceRecord>,
    pub fabric: FabricTopology,
    pub vlans: Vec<VlanRow>,
}

impl FabricData {
    /// Load `devices.yml`, `fabric.yml` and `vlans.csv` from the data directory
    pub fn load(config: &Config) -> Result<Self> {
        let inventory: Inventory = load_yaml(&config.inventory_path())?;
        let fabric: Value = load_yaml(&config.fabric_path())?;
        let vlans: Vec<VlanRow> = load_csv(&config.vlans_path())?;

        let data = Self::from_parts(inventory.devices, fabric, vlans)?;
        tracing::info!(
            "Loaded {} devices, {} VLAN rows from {}",
            data.devices.len(),
            data.vlans.len(),
            config.data_dir.display()
        );
        Ok(data)
    }

    pub fn from_parts(devices: Vec<DeviceRecord>, fabric: Value, vlans: Vec<VlanRow>) -> Result<Self> {
        validate_devices(&devices)?;

        let known: HashSet<&str> = devices.iter().map(|d| d.hostname.as_str()).collect();
        for row in &vlans {
            if !known.contains(row.device.as_str()) {
                return Err(Error::not_found("device", &row.device));
            }
        }

        let fabric = FabricTopology::new(fabric)?;

        Ok(Self {
            devices,
            fabric,
            vlans,
        })
    }

    pub fn device(&self, hostname: &str) -> Result<&DeviceRecord> {
        find_device(&self.devices, hostname)
    }

    /// One device when `hostname` is given, otherwise every device in inventory order
    pub fn select(&self, hostname: Option<&str>) -> Result<Vec<&DeviceRecord>> {
        match hostname {
            Some(h) => Ok(vec![self.device(h)?]),
            None => Ok(self.devices.iter().collect()),
        }
    }
}

/// Load only the device inventory, for commands that never render
pub fn load_devices(config: &Config) -> Result<Vec<DeviceRecord>> {
    let inventory: Inventory = load_yaml(&config.inventory_path())?;
    validate_devices(&inventory.devices)?;
    Ok(inventory.devices)
}

pub fn find_device<'a>(devices: &'a [DeviceRecord], hostname: &str) -> Result<&'a DeviceRecord> {
    devices
        .iter()
        .find(|d| d.hostname == hostname)
        .ok_or_else(|| Error::not_found("device", hostname))
}

fn validate_devices(devices: &[DeviceRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    for device in devices {
        if !is_valid_hostname(&device.hostname) {
            return Err(Error::data_format(
                "devices.yml",
                format!("invalid hostname {:?}", device.hostname),
            ));
        }
        if !is_valid_mgmt_address(&device.mgmt_ip) {
            return Err(Error::data_format(
                "devices.yml",
                format!("{}: invalid mgmt_ip {:?}", device.hostname, device.mgmt_ip),
            ));
        }
        if !seen.insert(device.hostname.as_str()) {
            return Err(Error::data_format(
                "devices.yml",
                format!("duplicate hostname {}", device.hostname),
            ));
        }
    }
    Ok(())
}

/// Parse a YAML file into `T`
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_yaml::from_str(&content).map_err(|e| Error::data_format(source_name(path), e))
}

/// Parse a CSV file with a header row into a list of `T`
pub fn load_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::None)
        .from_reader(file);

    reader
        .deserialize()
        .map(|row| row.map_err(|e| Error::data_format(source_name(path), e)))
        .collect()
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(device: &str, vlan_id: &str) -> VlanRow {
        VlanRow {
            device: device.to_string(),
            vlan_id: vlan_id.to_string(),
            name: "web".to_string(),
            vni: "10100".to_string(),
            ip: "10.0.0.1/24".to_string(),
        }
    }

    fn fabric() -> Value {
        json!({ "asn": 65000, "underlay_links": [] })
    }

    #[test]
    fn test_vlan_row_for_unknown_device() {
        let devices = vec![DeviceRecord::new("leaf1", "leaf", "10.0.0.11")];
        let err = FabricData::from_parts(devices, fabric(), vec![row("leaf9", "100")]).unwrap_err();
        assert!(matches!(err, Error::NotFound { ref resource, ref key } if resource == "device" && key == "leaf9"));
    }

    #[test]
    fn test_duplicate_hostname() {
        let devices = vec![
            DeviceRecord::new("leaf1", "leaf", "10.0.0.11"),
            DeviceRecord::new("leaf1", "leaf", "10.0.0.12"),
        ];
        let err = FabricData::from_parts(devices, fabric(), vec![]).unwrap_err();
        assert_eq!(err.kind(), "data-format");
    }

    #[test]
    fn test_hostname_must_be_file_safe() {
        let devices = vec![DeviceRecord::new("../leaf1", "leaf", "10.0.0.11")];
        let err = FabricData::from_parts(devices, fabric(), vec![]).unwrap_err();
        assert_eq!(err.kind(), "data-format");
    }

    #[test]
    fn test_ipv6_mgmt_address() {
        let devices = vec![
            DeviceRecord::new("leaf1", "leaf", "2001:db8::11"),
            DeviceRecord::new("leaf2", "leaf", "leaf2-mgmt.lab"),
        ];
        let data = FabricData::from_parts(devices, fabric(), vec![]).unwrap();
        assert_eq!(data.device("leaf1").unwrap().mgmt_ip, "2001:db8::11");

        let devices = vec![DeviceRecord::new("leaf1", "leaf", "2001:db8::11 ; reboot")];
        let err = FabricData::from_parts(devices, fabric(), vec![]).unwrap_err();
        assert_eq!(err.kind(), "data-format");
    }

    #[test]
    fn test_fabric_requires_underlay_links() {
        let devices = vec![DeviceRecord::new("leaf1", "leaf", "10.0.0.11")];
        let err = FabricData::from_parts(devices.clone(), json!({ "asn": 65000 }), vec![]).unwrap_err();
        assert_eq!(err.kind(), "not-found");

        let err = FabricData::from_parts(devices.clone(), json!({ "underlay_links": "none" }), vec![]).unwrap_err();
        assert_eq!(err.kind(), "data-format");

        let err = FabricData::from_parts(devices, json!(["not", "a", "map"]), vec![]).unwrap_err();
        assert_eq!(err.kind(), "data-format");
    }

    #[test]
    fn test_device_lookup() {
        let devices = vec![
            DeviceRecord::new("leaf1", "leaf", "10.0.0.11"),
            DeviceRecord::new("spine1", "spine", "10.0.0.1"),
        ];
        let data = FabricData::from_parts(devices, fabric(), vec![row("leaf1", "100")]).unwrap();
        assert_eq!(data.device("spine1").unwrap().role, "spine");
        assert_eq!(data.device("leaf2").unwrap_err().kind(), "not-found");
        assert_eq!(data.select(None).unwrap().len(), 2);
        assert_eq!(data.select(Some("leaf1")).unwrap()[0].hostname, "leaf1");
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::write(
            config.inventory_path(),
            "devices:\n  - hostname: leaf1\n    role: leaf\n    mgmt_ip: 10.0.0.11\n    asn: 65101\n",
        )
        .unwrap();
        std::fs::write(
            config.fabric_path(),
            "underlay_links:\n  - a: leaf1\n    b: spine1\n",
        )
        .unwrap();
        std::fs::write(
            config.vlans_path(),
            "device,vlan_id,name,vni,ip\nleaf1,100,web,10100,10.0.0.1/24\n",
        )
        .unwrap();

        let data = FabricData::load(&config).unwrap();
        assert_eq!(data.devices.len(), 1);
        assert_eq!(data.devices[0].extra["asn"], json!(65101));
        assert_eq!(data.vlans[0].vlan_id, "100");
        assert_eq!(data.fabric.underlay_links()[0]["b"], json!("spine1"));
    }

    #[test]
    fn test_malformed_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.yml");
        std::fs::write(&path, "devices:\n  - hostname: leaf1\n").unwrap();
        let err = load_yaml::<Inventory>(&path).unwrap_err();
        assert!(matches!(err, Error::DataFormat { ref source_name, .. } if source_name == "devices.yml"));
    }

    #[test]
    fn test_malformed_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vlans.csv");
        std::fs::write(&path, "device,vlan_id\nleaf1,100\n").unwrap();
        let err = load_csv::<VlanRow>(&path).unwrap_err();
        assert_eq!(err.kind(), "data-format");
    }
}
