//! Object path derivation
//!
//! Paths are a pure function of entity identity:
//!
//! ```text
//! /org/bluealsa                                    manager
//! /org/bluealsa/hci0                               adapter 0
//! /org/bluealsa/hci0/dev_AA_BB_CC_DD_EE_FF         device
//! /org/bluealsa/hci0/dev_AA_BB_CC_DD_EE_FF/a2dpsnk transport
//! ```

use crate::bus::{object_path, ObjectPath};
use crate::error::Result;

use super::types::{BdAddr, TransportProfile};

/// Fixed root of every object this daemon exports; also the manager path
pub const ROOT_PATH: &str = "/org/bluealsa";

/// Path of the manager object
pub fn manager_path() -> ObjectPath {
    object_path(ROOT_PATH).expect("ROOT_PATH is a valid object path")
}

/// Adapter name as used by BlueZ (e.g. `hci0`)
pub fn adapter_name(index: u16) -> String {
    format!("hci{}", index)
}

pub fn adapter_path(index: u16) -> Result<ObjectPath> {
    Ok(object_path(&format!("{}/{}", ROOT_PATH, adapter_name(index)))?)
}

pub fn device_path(index: u16, address: &BdAddr) -> Result<ObjectPath> {
    Ok(object_path(&format!(
        "{}/{}/{}",
        ROOT_PATH,
        adapter_name(index),
        address.path_element()
    ))?)
}

pub fn transport_path(index: u16, address: &BdAddr, profile: TransportProfile) -> Result<ObjectPath> {
    Ok(object_path(&format!(
        "{}/{}/{}/{}",
        ROOT_PATH,
        adapter_name(index),
        address.path_element(),
        profile.path_tag()
    ))?)
}
