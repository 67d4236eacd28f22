pub mod config_text;
pub mod devices;
pub mod vlans;

pub use config_text::{CommandSet, ConfigText};
pub use devices::{ConnectionParams, DeviceRecord, Inventory};
pub use vlans::{Vlan, VlanRow};
