//! Default configuration values

/// Registry client defaults
pub mod registry {
    /// Well-known registry address
    pub const ADDRESS: &str = "127.0.0.1:10101";

    /// Resolve round-trip limit (milliseconds)
    pub const RESOLVE_TIMEOUT_MS: u64 = 5_000;

    /// Attempts for resolutions made after initialization
    pub const RETRY_ATTEMPTS: u32 = 3;

    /// Pause between retry attempts (milliseconds)
    pub const RETRY_BACKOFF_MS: u64 = 200;
}

/// Module defaults
pub mod module {
    pub const NAME: &str = "module";
    pub const ID: &str = "0";

    /// Pause between ticks (milliseconds)
    pub const TICK_INTERVAL_MS: u64 = 10;

    /// Blocking acknowledgment wait limit (milliseconds)
    pub const ACK_TIMEOUT_MS: u64 = 5_000;

    /// TCP connect limit (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Largest accepted frame (1 MiB)
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
}

/// Name server defaults
pub mod name_server {
    pub const BIND_ADDRESS: &str = "127.0.0.1:10101";
    pub const ADVERTISED_HOST: &str = "127.0.0.1";

    /// First port handed out when allocating sequentially
    pub const PORT_BASE: u16 = 60_000;
}
