/// Configuration for the remote-call forwarder pipeline.
///
/// Controls the per-call timeout and the concurrency limit before load shedding.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Bound on every single bus round-trip, in milliseconds.
    pub call_timeout_ms: u64,
    /// Maximum number of concurrent remote calls before load shedding.
    pub max_concurrent_calls: u32,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            max_concurrent_calls: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bound_calls_at_ten_seconds() {
        let config = ForwarderConfig::default();
        assert_eq!(config.call_timeout_ms, 10_000);
        assert_eq!(config.max_concurrent_calls, 1000);
    }
}
