// src/constants.rs

/// Base word for config file names and the env var prefix.
pub const CONFIG_PREFIX: &str = "drover";

/// Env var prefix: uppercase of the base word plus a joining underscore.
pub const ENV_PREFIX: &str = "DROVER_";

/// Config file suffixes searched per tier, in preference order.
pub const FILE_SUFFIXES: &[&str] = &["toml", "json"];

/// Path prefix searched for the system-tier config file.
pub const SYSTEM_PREFIX: &str = "/etc/";

/// Default collection name sought by loaders in task-runner mode.
pub const DEFAULT_COLLECTION_NAME: &str = "tasks";

/// Byte written to a subprocess' stdin when an interrupt is forwarded.
pub const INTERRUPT_BYTE: u8 = 0x03;

/// Bytes read per iteration by the output-draining workers.
pub const READ_CHUNK_SIZE: usize = 1000;

/// Sleep applied in poll loops (process wait, stdin mirroring).
pub const INPUT_SLEEP_MS: u64 = 10;
