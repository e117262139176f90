use std::time::Duration;

/// Base retry policy for any mutating cloud operation (§4.4.1). Not exposed
/// through the YAML config — these are the documented defaults, not
/// operator-tunable.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry_base: Duration,
    pub retry_factor: u32,
    pub retry_max_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            retry_base: Duration::from_secs(1),
            retry_factor: 2,
            retry_max_attempts: 3,
        }
    }
}
