// MIT License
// Panel web interface constants

/// Login form endpoint.
pub const LOGIN_PATH: &str = "li.php";
/// Output control endpoint.
pub const OUTPUT_CONTROL_PATH: &str = "ot.php";
/// Partition control endpoint.
pub const PARTITION_CONTROL_PATH: &str = "pn.php";

/// Exact body returned by a successful login.
pub const LOGIN_ACK: &str = "ok";
/// Exact body returned by a successful control command.
pub const COMMAND_ACK: &str = "Success";

/// Prefix of the client-generated session token.
pub const TOKEN_PREFIX: &str = "GUID-";

/// Content type for control commands. The body is not a real form: fields
/// are separated by `?` instead of `&`.
pub const COMMAND_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// The sysinfo label carrying model, serial and firmware version.
pub const SYSTEM_INFO_LABEL: &str = "System";

/// Number of user records requested from `config.cfx`. Users are not decoded,
/// so fetching a single one keeps the download small.
pub const CONFIG_USER_COUNT: u32 = 1;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 65;
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_FAILURE_ESCALATION: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 64;
