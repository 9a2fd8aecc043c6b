use alloc::sync::Arc;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: Arc<str>,
    pub port: u16,
    pub running_title: Arc<str>,
    pub running_version: Arc<str>,
    pub chunk_retry_ceiling: u8,
    pub chunk_size: u32,
    pub chunk_timeout_ms: u64,
}

impl Config {
    pub const DEFAULT_RETRY_CEILING: u8 = 5;
    pub const DEFAULT_CHUNK_SIZE: u32 = 4096;
    pub const DEFAULT_CHUNK_TIMEOUT_MS: u64 = 5_000;

    pub fn new() -> Self {
        let defaults = Self::default();

        Self {
            host: option_env!("FOTA_HOST").map(Arc::from).unwrap_or(defaults.host.clone()),
            port: option_env!("FOTA_PORT")
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.port),
            running_title: option_env!("FIRMWARE_TITLE")
                .map(Arc::from)
                .unwrap_or(defaults.running_title.clone()),
            running_version: option_env!("FIRMWARE_VERSION")
                .map(Arc::from)
                .unwrap_or(defaults.running_version.clone()),
            ..defaults
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Arc::from("0.0.0.0"),
            port: 3000,
            running_title: Arc::from("ESPino32"),
            running_version: Arc::from("1.0.0"),
            chunk_retry_ceiling: Self::DEFAULT_RETRY_CEILING,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            chunk_timeout_ms: Self::DEFAULT_CHUNK_TIMEOUT_MS,
        }
    }
}
