/// Constants used throughout the cairn codebase
// Entry directory artifacts
pub const RESULT_FILE: &str = "_result.json";
pub const TASK_SNAPSHOT_FILE: &str = "_task.json";
pub const ERROR_FILE: &str = "_error.json";
pub const LOCK_SUFFIX: &str = "lock";

// Bookkeeping input carrying a function task's callable reference
pub const FUNCTION_FIELD: &str = "_func";

// Environment variable names
pub const CAIRN_CACHE_DIR_VAR: &str = "CAIRN_CACHE_DIR";
pub const CAIRN_LOCK_TIMEOUT_VAR: &str = "CAIRN_LOCK_TIMEOUT_SECS";
pub const CAIRN_MONITOR_INTERVAL_VAR: &str = "CAIRN_MONITOR_INTERVAL_MS";
pub const CAIRN_PROV_CONTEXT_VAR: &str = "CAIRN_PROV_CONTEXT";
pub const CAIRN_LOG_VAR: &str = "CAIRN_LOG";

// Prefix of ephemeral cache roots
pub const EPHEMERAL_CACHE_PREFIX: &str = "cairn-";
