// MIT License
// Panel web interface resources and XML decoding

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::constants::SYSTEM_INFO_LABEL;
use crate::devices::{DesiredOutput, DesiredPartition, DeviceIdentity, Privileges};
use crate::error::{BridgeError, Result};

/// The XML resources served by the panel's web interface.
///
/// Every resource is fetched with `GET /<path>?guid=<token>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// `poll.xml`: Heartbeat. Returns `<poll><t>secs</t></poll>`, the
    /// seconds left before the session expires.
    Poll,
    /// `refr.xml`: Extends the session. Same body as `poll.xml`.
    /// Only accepted by the panel when the session is close to expiry.
    Refresh,
    /// `sysinfo.xml`: Label/value pairs (`System`, `Mains`, `Battery`, ...).
    SystemInformation,
    /// `priv.xml`: Privileges of the logged-in user, `<pt xd="key">0|1</pt>`.
    Privileges,
    /// `pnames.xml`: Partition names.
    PartitionNames,
    /// `znames.xml`: Zone names.
    ZoneNames,
    /// `onames.xml`: Output names.
    OutputNames,
    /// `pstats.xml`: Partition states, `<pn xd xo xt xs>code</pn>`.
    PartitionStatus,
    /// `zstats.xml`: Zone states, `<zs xd xo>code</zs>`.
    ZoneStatus,
    /// `ostats.xml`: Output states, `<os xd xo>code</os>`.
    OutputStatus,
    /// `config.cfx?n=<users>`: The panel configuration file. Only the zone
    /// to partition links are decoded.
    Config,
}

impl Resource {
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Poll => "poll.xml",
            Resource::Refresh => "refr.xml",
            Resource::SystemInformation => "sysinfo.xml",
            Resource::Privileges => "priv.xml",
            Resource::PartitionNames => "pnames.xml",
            Resource::ZoneNames => "znames.xml",
            Resource::OutputNames => "onames.xml",
            Resource::PartitionStatus => "pstats.xml",
            Resource::ZoneStatus => "zstats.xml",
            Resource::OutputStatus => "ostats.xml",
            Resource::Config => "config.cfx",
        }
    }

    /// Human-readable name used in errors and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Resource::Poll => "session poll",
            Resource::Refresh => "session refresh",
            Resource::SystemInformation => "system information",
            Resource::Privileges => "privileges",
            Resource::PartitionNames => "partition names",
            Resource::ZoneNames => "zone names",
            Resource::OutputNames => "output names",
            Resource::PartitionStatus => "partition status",
            Resource::ZoneStatus => "zone status",
            Resource::OutputStatus => "output status",
            Resource::Config => "config",
        }
    }

    /// Expected root element of the response document.
    fn root(&self) -> &'static str {
        match self {
            Resource::Poll | Resource::Refresh => "poll",
            Resource::SystemInformation => "sysinfo",
            Resource::Privileges => "priv",
            Resource::PartitionNames => "pname",
            Resource::ZoneNames => "zname",
            Resource::OutputNames => "oname",
            Resource::PartitionStatus => "pstat",
            Resource::ZoneStatus => "zstat",
            Resource::OutputStatus => "ostat",
            Resource::Config => "ELITE-SX",
        }
    }
}

// ----- Decoded records -----

/// One `(index, name)` entry of a name list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedIndex {
    pub index: u32,
    pub name: String,
}

/// Auxiliary attributes carried alongside a status code.
///
/// Their meaning is not documented by the panel; they are kept for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxFlags {
    pub xo: Option<u16>,
    pub xt: Option<u16>,
    pub xs: Option<u16>,
}

/// One entity's raw state from a status resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSample {
    pub index: u32,
    pub raw_state: u16,
    pub aux: AuxFlags,
}

/// The privileges document: firmware version plus decoded flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeSet {
    pub version: Option<u32>,
    pub flags: Privileges,
}

/// A zone entry of the panel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigZone {
    pub index: u32,
    pub name: String,
    pub partitions: Vec<u32>,
}

// ----- Wire documents -----

#[derive(Debug, Deserialize)]
struct PollDoc {
    t: u64,
}

#[derive(Debug, Deserialize)]
struct NamesDoc {
    #[serde(rename = "pn", default)]
    entries: Vec<NameElement>,
}

#[derive(Debug, Deserialize)]
struct NameElement {
    #[serde(rename = "@xd")]
    index: u32,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatusElement {
    #[serde(rename = "@xd")]
    index: u32,
    #[serde(rename = "@xo")]
    xo: Option<u16>,
    #[serde(rename = "@xt")]
    xt: Option<u16>,
    #[serde(rename = "@xs")]
    xs: Option<u16>,
    #[serde(rename = "$text")]
    code: u16,
}

impl From<StatusElement> for StatusSample {
    fn from(e: StatusElement) -> Self {
        StatusSample {
            index: e.index,
            raw_state: e.code,
            aux: AuxFlags {
                xo: e.xo,
                xt: e.xt,
                xs: e.xs,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PartitionStatusDoc {
    #[serde(rename = "pn", default)]
    entries: Vec<StatusElement>,
}

#[derive(Debug, Deserialize)]
struct ZoneStatusDoc {
    #[serde(rename = "zs", default)]
    entries: Vec<StatusElement>,
}

#[derive(Debug, Deserialize)]
struct OutputStatusDoc {
    #[serde(rename = "os", default)]
    entries: Vec<StatusElement>,
}

#[derive(Debug, Deserialize)]
struct SysInfoDoc {
    #[serde(rename = "info", default)]
    entries: Vec<InfoElement>,
}

#[derive(Debug, Deserialize)]
struct InfoElement {
    #[serde(default)]
    lbl: String,
    #[serde(default)]
    val: String,
}

#[derive(Debug, Deserialize)]
struct PrivDoc {
    v: Option<u32>,
    #[serde(rename = "pt", default)]
    entries: Vec<PrivElement>,
}

#[derive(Debug, Deserialize)]
struct PrivElement {
    #[serde(rename = "@xd")]
    key: String,
    #[serde(rename = "$text")]
    value: u8,
}

#[derive(Debug, Deserialize)]
struct ConfigDoc {
    #[serde(default)]
    zones: ConfigZones,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigZones {
    #[serde(rename = "zone", default)]
    entries: Vec<ConfigZoneElement>,
}

#[derive(Debug, Deserialize)]
struct ConfigZoneElement {
    #[serde(rename = "@id")]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    partns: ConfigPartitions,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPartitions {
    #[serde(rename = "pn", default)]
    entries: Vec<ConfigPartitionElement>,
}

#[derive(Debug, Deserialize)]
struct ConfigPartitionElement {
    #[serde(rename = "@id")]
    id: u32,
}

// ----- Decoding -----

/// Name of the first element of `body`, skipping the declaration and
/// processing instructions.
fn root_element(body: &str) -> Option<String> {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

fn decode<T: DeserializeOwned>(resource: Resource, body: &str) -> Result<T> {
    let body = body.trim_start();
    match root_element(body) {
        Some(root) if root == resource.root() => {}
        Some(root) => {
            return Err(BridgeError::Decode {
                resource: resource.label(),
                details: format!("expected <{}>, found <{}>", resource.root(), root),
            });
        }
        None => {
            return Err(BridgeError::Decode {
                resource: resource.label(),
                details: "no root element".to_string(),
            });
        }
    }
    quick_xml::de::from_str(body).map_err(|e| BridgeError::Decode {
        resource: resource.label(),
        details: e.to_string(),
    })
}

/// Seconds until the session expires, from `poll.xml` or `refr.xml`.
pub fn decode_session_poll(resource: Resource, body: &str) -> Result<u64> {
    decode::<PollDoc>(resource, body).map(|doc| doc.t)
}

/// Decode one of the name lists (`pnames`, `znames`, `onames`).
pub fn decode_names(resource: Resource, body: &str) -> Result<Vec<NamedIndex>> {
    let doc: NamesDoc = decode(resource, body)?;
    Ok(doc
        .entries
        .into_iter()
        .map(|e| NamedIndex {
            index: e.index,
            name: e.name.trim().to_string(),
        })
        .collect())
}

/// Decode one of the status lists (`pstats`, `zstats`, `ostats`).
pub fn decode_statuses(resource: Resource, body: &str) -> Result<Vec<StatusSample>> {
    let entries = match resource {
        Resource::PartitionStatus => decode::<PartitionStatusDoc>(resource, body)?.entries,
        Resource::ZoneStatus => decode::<ZoneStatusDoc>(resource, body)?.entries,
        Resource::OutputStatus => decode::<OutputStatusDoc>(resource, body)?.entries,
        other => {
            return Err(BridgeError::Decode {
                resource: other.label(),
                details: "not a status resource".to_string(),
            });
        }
    };
    Ok(entries.into_iter().map(StatusSample::from).collect())
}

/// Extract the panel identity from the `System` line of `sysinfo.xml`.
pub fn decode_system_information(body: &str) -> Result<DeviceIdentity> {
    let resource = Resource::SystemInformation;
    let doc: SysInfoDoc = decode(resource, body)?;
    let line = doc
        .entries
        .iter()
        .find(|e| e.lbl.trim() == SYSTEM_INFO_LABEL)
        .map(|e| e.val.as_str())
        .ok_or_else(|| BridgeError::Decode {
            resource: resource.label(),
            details: format!("no '{}' entry", SYSTEM_INFO_LABEL),
        })?;
    DeviceIdentity::parse(line).ok_or_else(|| BridgeError::Decode {
        resource: resource.label(),
        details: format!("unrecognised system line '{}'", line),
    })
}

pub fn decode_privileges(body: &str) -> Result<PrivilegeSet> {
    let doc: PrivDoc = decode(Resource::Privileges, body)?;
    let flags = Privileges::from_entries(doc.entries.iter().map(|e| (e.key.as_str(), e.value)));
    Ok(PrivilegeSet {
        version: doc.v,
        flags,
    })
}

pub fn decode_config(body: &str) -> Result<Vec<ConfigZone>> {
    let doc: ConfigDoc = decode(Resource::Config, body)?;
    Ok(doc
        .zones
        .entries
        .into_iter()
        .map(|z| ConfigZone {
            index: z.id,
            name: z.name.trim().to_string(),
            partitions: z.partns.entries.iter().map(|p| p.id).collect(),
        })
        .collect())
}

// ----- Control commands -----

/// Body for `ot.php`. The fields are joined by `?`, not `&`, so the body
/// is written by hand rather than form-encoded.
pub fn output_command_body(index: u32, desired: DesiredOutput, token: &str) -> String {
    format!("op{}=op{}?GUID={}", desired.verb(), index, token)
}

/// Body for `pn.php`.
pub fn partition_command_body(index: u32, desired: DesiredPartition, token: &str) -> String {
    format!("pn{}=pn{}?GUID={}", desired.verb(), index, token)
}

#[cfg(test)]
pub(crate) mod samples {
    //! Documents captured from a real panel.

    pub const PROLOG: &str = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\" ?>\n";

    pub const POLL: &str = "<poll><t>1200</t></poll>";

    pub const SYSINFO: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="sysinfo.xsl"?>
<sysinfo><info><lbl>System</lbl><val>Elite-SX (12345678) Ver 10.0.307</val></info><info><lbl>Mains</lbl><val>OK</val></info><info><lbl>Battery</lbl><val>OK</val></info><info><lbl>Zone Expander</lbl><val>Id.1 Ver 0.1.30 (12345678) Online</val></info></sysinfo>"#;

    pub const PRIV: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="priv.xsl"?>
<priv><v>307</v><pt xd="aiarmaway">1</pt><pt xd="aiarmstay">1</pt><pt xd="aidisaway">1</pt><pt xd="aidisstay">1</pt><pt xd="aiguard">0</pt><pt xd="mista">1</pt></priv>"#;

    pub const PNAMES: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="pnames.xsl"?>
<pname><pn xd="1"><name>House</name></pn><pn xd="2"><name>Garage</name></pn><pn xd="3"><name>Sleepout</name></pn></pname>"#;

    pub const ONAMES: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="onames.xsl"?>
<oname><pn xd="1"><name>External Siren</name></pn><pn xd="2"><name>Internal Siren</name></pn><pn xd="4"><name>Output 4</name></pn><pn xd="9"><name>External Siren</name></pn><pn xd="10"><name>Internal Siren</name></pn><pn xd="12"><name>Garage Door</name></pn></oname>"#;

    pub const ZNAMES: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="znames.xsl"?>
<zname><pn xd="1"><name>Lounge</name></pn><pn xd="2"><name>Hallway</name></pn><pn xd="3"><name>Laundry</name></pn><pn xd="4"><name>Master Bedroom</name></pn><pn xd="6"><name>Lounge Smoke</name></pn><pn xd="7"><name>Hallway Smoke</name></pn><pn xd="8"><name>Kitchen Heat</name></pn><pn xd="9"><name>Garage</name></pn><pn xd="10"><name>Heat (Garage)</name></pn><pn xd="11"><name>Sleepout</name></pn><pn xd="12"><name>Smoke (Sleepout)</name></pn><pn xd="13"><name>Smoke Tmp (Sleepout)</name></pn></zname>"#;

    pub const PSTATS: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="pstats.xsl"?>
<pstat><pn xd="1" xo="143" xt="0" xs="0">0</pn><pn xd="2" xo="143" xt="0" xs="0">0</pn><pn xd="3" xo="143" xt="0" xs="1">1</pn></pstat>"#;

    pub const OSTATS: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="ostats.xsl"?>
<ostat><os xd="1" xo="0">1</os><os xd="2" xo="0">0</os><os xd="4" xo="0">0</os><os xd="12" xo="0">0</os></ostat>"#;

    pub const ZSTATS: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<?xml-stylesheet type="text/xsl" href="zstats.xsl"?>
<zstat><zs xd="1" xo="0">1</zs><zs xd="2" xo="0">0</zs><zs xd="11" xo="0">0</zs><zs xd="13" xo="2">0</zs></zstat>"#;

    pub const CONFIG: &str = r#"<ELITE-SX><zones><zone id="1"><name>Lounge</name><partns><pn id="1" /></partns></zone><zone id="11"><name>Sleepout</name><partns><pn id="1" /><pn id="3" /></partns></zone></zones></ELITE-SX>"#;

    /// Wrap entries in a status document, e.g. `status_doc("pstat", "pn", &[(3, 1)])`.
    pub fn status_doc(root: &str, element: &str, entries: &[(u32, u16)]) -> String {
        let mut body = format!("{PROLOG}<{root}>");
        for (index, code) in entries {
            body.push_str(&format!("<{element} xd=\"{index}\" xo=\"0\">{code}</{element}>"));
        }
        body.push_str(&format!("</{root}>"));
        body
    }
}
