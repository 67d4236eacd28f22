use serde::{Deserialize, Serialize};

/// VlanRow is one row of the VLAN table as stored: numeric columns are text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanRow {
    pub device: String,
    pub vlan_id: String,
    pub name: String,
    pub vni: String,
    pub ip: String,
}

/// Vlan is a VLAN assignment as exposed to templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub id: u32,
    pub name: String,
    pub vni: u32,
    pub ip: String,
}
