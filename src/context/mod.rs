use serde_json::{json, Map, Value};

use crate::data::FabricTopology;
use crate::error::{Error, Result};
use crate::models::{DeviceRecord, Vlan, VlanRow};

/// RenderContext is the flat, device-scoped mapping handed to a template.
///
/// Keys: every inventory attribute of the device, then `fabric`, `vlans`
/// and `underlay_links` (later keys win on collision).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    hostname: String,
    vlans: Vec<Vlan>,
    values: Map<String, Value>,
}

impl RenderContext {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// VLANs assigned to this device, in VLAN table order; empty when none
    pub fn vlans(&self) -> &[Vlan] {
        &self.vlans
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Project one device and the shared fabric data into a render context.
///
/// No I/O; identical inputs always give an identical context.
pub fn build_context(
    device: &DeviceRecord,
    fabric: &FabricTopology,
    all_vlans: &[VlanRow],
) -> Result<RenderContext> {
    let vlans = all_vlans
        .iter()
        .filter(|row| row.device == device.hostname)
        .map(coerce_vlan)
        .collect::<Result<Vec<_>>>()?;

    let mut values = Map::new();
    values.insert("hostname".to_string(), json!(device.hostname));
    values.insert("role".to_string(), json!(device.role));
    values.insert("mgmt_ip".to_string(), json!(device.mgmt_ip));
    for (key, value) in &device.extra {
        values.insert(key.clone(), value.clone());
    }
    values.insert("fabric".to_string(), fabric.as_value().clone());
    values.insert("vlans".to_string(), vlans_value(&vlans));
    values.insert("underlay_links".to_string(), fabric.underlay_links().clone());

    Ok(RenderContext {
        hostname: device.hostname.clone(),
        vlans,
        values,
    })
}

fn coerce_vlan(row: &VlanRow) -> Result<Vlan> {
    Ok(Vlan {
        id: parse_int(&row.device, "vlan_id", &row.vlan_id)?,
        name: row.name.clone(),
        vni: parse_int(&row.device, "vni", &row.vni)?,
        ip: row.ip.clone(),
    })
}

fn parse_int(device: &str, field: &str, value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| Error::TypeConversion {
        device: device.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn vlans_value(vlans: &[Vlan]) -> Value {
    Value::Array(
        vlans
            .iter()
            .map(|v| json!({ "id": v.id, "name": v.name, "vni": v.vni, "ip": v.ip }))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabric() -> FabricTopology {
        FabricTopology::new(json!({
            "asn": 65000,
            "underlay_links": [{ "a": "leaf1", "a_port": "Eth1/49", "b": "spine1", "b_port": "Eth1/1" }]
        }))
        .unwrap()
    }

    fn row(device: &str, vlan_id: &str, vni: &str, name: &str) -> VlanRow {
        VlanRow {
            device: device.to_string(),
            vlan_id: vlan_id.to_string(),
            name: name.to_string(),
            vni: vni.to_string(),
            ip: "10.0.0.1/24".to_string(),
        }
    }

    #[test]
    fn test_vlans_filtered_to_device() {
        let leaf1 = DeviceRecord::new("leaf1", "leaf", "10.0.0.11");
        let rows = vec![
            row("leaf1", "100", "10100", "web"),
            row("leaf2", "200", "10200", "db"),
        ];

        let ctx = build_context(&leaf1, &fabric(), &rows).unwrap();
        assert_eq!(
            ctx.vlans(),
            &[Vlan {
                id: 100,
                name: "web".to_string(),
                vni: 10100,
                ip: "10.0.0.1/24".to_string(),
            }]
        );
        assert_eq!(
            ctx.get("vlans").unwrap(),
            &json!([{ "id": 100, "name": "web", "vni": 10100, "ip": "10.0.0.1/24" }])
        );
    }

    #[test]
    fn test_source_order_is_kept() {
        let leaf1 = DeviceRecord::new("leaf1", "leaf", "10.0.0.11");
        let rows = vec![
            row("leaf1", "300", "10300", "c"),
            row("leaf2", "200", "10200", "x"),
            row("leaf1", "100", "10100", "a"),
        ];
        let ctx = build_context(&leaf1, &fabric(), &rows).unwrap();
        let ids: Vec<u32> = ctx.vlans().iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![300, 100]);
    }

    #[test]
    fn test_device_without_vlans_gets_empty_list() {
        let spine = DeviceRecord::new("spine1", "spine", "10.0.0.1");
        let rows = vec![row("leaf1", "100", "10100", "web")];
        let ctx = build_context(&spine, &fabric(), &rows).unwrap();
        assert!(ctx.vlans().is_empty());
        assert_eq!(ctx.get("vlans"), Some(&json!([])));
    }

    #[test]
    fn test_non_numeric_vlan_field() {
        let leaf1 = DeviceRecord::new("leaf1", "leaf", "10.0.0.11");
        let rows = vec![row("leaf1", "100", "ten", "web")];
        let err = build_context(&leaf1, &fabric(), &rows).unwrap_err();
        match err {
            Error::TypeConversion { device, field, value } => {
                assert_eq!(device, "leaf1");
                assert_eq!(field, "vni");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_row_for_other_device_is_ignored() {
        let leaf1 = DeviceRecord::new("leaf1", "leaf", "10.0.0.11");
        let rows = vec![row("leaf2", "abc", "10200", "db")];
        assert!(build_context(&leaf1, &fabric(), &rows).is_ok());
    }

    #[test]
    fn test_context_merges_device_and_fabric() {
        let mut leaf1 = DeviceRecord::new("leaf1", "leaf", "10.0.0.11");
        leaf1.extra.insert("loopback0".to_string(), json!("10.255.0.11"));
        let ctx = build_context(&leaf1, &fabric(), &[]).unwrap();

        assert_eq!(ctx.hostname(), "leaf1");
        assert_eq!(ctx.get("role"), Some(&json!("leaf")));
        assert_eq!(ctx.get("mgmt_ip"), Some(&json!("10.0.0.11")));
        assert_eq!(ctx.get("loopback0"), Some(&json!("10.255.0.11")));
        assert_eq!(ctx.get("fabric").unwrap()["asn"], json!(65000));
        assert_eq!(ctx.get("underlay_links").unwrap()[0]["b"], json!("spine1"));
    }

    #[test]
    fn test_deterministic() {
        let leaf1 = DeviceRecord::new("leaf1", "leaf", "10.0.0.11");
        let rows = vec![row("leaf1", "100", "10100", "web")];
        assert_eq!(
            build_context(&leaf1, &fabric(), &rows).unwrap(),
            build_context(&leaf1, &fabric(), &rows).unwrap()
        );
    }
}
