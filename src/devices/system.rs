// MIT License
// Panel identity and user privileges

use bitflags::bitflags;

/// Identity of the panel, parsed from the `System` line of `sysinfo.xml`.
///
/// The line looks like `Elite-SX (12345678) Ver 10.0.307`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub model: String,
    pub serial: String,
    pub software_version: String,
}

impl DeviceIdentity {
    pub fn parse(line: &str) -> Option<Self> {
        let (model, rest) = line.split_once('(')?;
        let (serial, version) = rest.split_once(')')?;
        let model = model.trim();
        let serial = serial.trim();
        if model.is_empty() || serial.is_empty() {
            return None;
        }
        let version = version.trim();
        let version = version.strip_prefix("Ver").unwrap_or(version).trim();
        Some(Self {
            model: model.to_string(),
            serial: serial.to_string(),
            software_version: version.to_string(),
        })
    }

    /// Display name, e.g. `Elite-SX (12345678)`.
    pub fn name(&self) -> String {
        format!("{} ({})", self.model, self.serial)
    }
}

bitflags! {
    /// Arm/disarm privileges of the logged-in user, from `priv.xml`.
    ///
    /// Only the keys the bridge cares about are decoded; the panel reports
    /// many more menu-level privileges.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Privileges: u8 {
        /// aiarmaway
        const ARM_AWAY     = 1 << 0;
        /// aiarmstay
        const ARM_STAY     = 1 << 1;
        /// aidisaway
        const DISARM_AWAY  = 1 << 2;
        /// aidisstay
        const DISARM_STAY  = 1 << 3;
        /// aiguard
        const GUARD        = 1 << 4;
        /// aijuvie
        const JUVENILE     = 1 << 5;
    }
}

const PRIVILEGE_KEYS: [(&str, Privileges); 6] = [
    ("aiarmaway", Privileges::ARM_AWAY),
    ("aiarmstay", Privileges::ARM_STAY),
    ("aidisaway", Privileges::DISARM_AWAY),
    ("aidisstay", Privileges::DISARM_STAY),
    ("aiguard", Privileges::GUARD),
    ("aijuvie", Privileges::JUVENILE),
];

impl Privileges {
    /// Build from `(key, value)` pairs; a privilege is granted when its value is non-zero.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, u8)>) -> Self {
        let mut flags = Self::empty();
        for (key, value) in entries {
            if value == 0 {
                continue;
            }
            if let Some((_, flag)) = PRIVILEGE_KEYS.iter().find(|(k, _)| *k == key) {
                flags |= *flag;
            }
        }
        flags
    }

    /// Whether partition commands sent by the bridge can succeed.
    pub fn can_control_partitions(&self) -> bool {
        self.contains(Self::ARM_AWAY | Self::DISARM_AWAY)
    }
}
