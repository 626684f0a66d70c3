//! Robot identity derived from the wireless interface's MAC address.
//!
//! The MAC is read from sysfs (`/sys/class/net/<wlan*>/address`) and looked
//! up in a JSON MAC list (`{"aa:bb:cc:dd:ee:ff": "7", ...}`) to find the
//! robot id that names all of this robot's fleet topics.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::error::IdentityError;

/// Default sysfs root for network interfaces.
pub const NET_CLASS_ROOT: &str = "/sys/class/net";

/// Colon-separated lowercase MAC: `aa:bb:cc:dd:ee:ff` (17 chars).
pub type MacString = heapless::String<17>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

pub fn format_mac(mac: &MacAddress) -> MacString {
    let mut s = MacString::new();
    use core::fmt::Write;
    let _ = write!(
        s,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    s
}

/// Parse `aa:bb:cc:dd:ee:ff` (either case, `-` also accepted).
pub fn parse_mac(raw: &str) -> Result<MacAddress, IdentityError> {
    let raw = raw.trim();
    let mut mac = [0u8; 6];
    let mut parts = raw.split([':', '-']);
    for byte in &mut mac {
        let part = parts
            .next()
            .filter(|p| p.len() == 2 && p.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| IdentityError::BadMac(raw.to_owned()))?;
        *byte = u8::from_str_radix(part, 16).map_err(|_| IdentityError::BadMac(raw.to_owned()))?;
    }
    if parts.next().is_some() {
        return Err(IdentityError::BadMac(raw.to_owned()));
    }
    Ok(mac)
}

/// MAC of the first (by name) interface under `net_root` whose name
/// contains `wlan`.
pub fn read_mac(net_root: &Path) -> Result<MacAddress, IdentityError> {
    let mut names: Vec<String> = fs::read_dir(net_root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("wlan"))
        .collect();
    names.sort();
    let iface = names.first().ok_or(IdentityError::NoInterface)?;
    let raw = fs::read_to_string(net_root.join(iface).join("address"))?;
    parse_mac(&raw)
}

/// MAC address → robot id table.
#[derive(Debug, Clone, Default)]
pub struct MacList {
    ids: HashMap<MacString, String>,
}

impl MacList {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IdentityError> {
        let raw: HashMap<String, Value> =
            serde_json::from_reader(reader).map_err(|e| IdentityError::MacList(e.to_string()))?;

        let mut ids = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let mac = parse_mac(&key)?;
            let id = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(IdentityError::MacList(format!(
                        "id for {key} is not a string: {other}"
                    )));
                }
            };
            ids.insert(format_mac(&mac), id);
        }
        Ok(Self { ids })
    }

    pub fn from_path(path: &Path) -> Result<Self, IdentityError> {
        let file = fs::File::open(path)
            .map_err(|e| IdentityError::MacList(format!("{}: {e}", path.display())))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn resolve(&self, mac: &MacAddress) -> Result<&str, IdentityError> {
        let key = format_mac(mac);
        self.ids
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| IdentityError::UnknownMac(key.as_str().to_owned()))
    }
}
