use std::num::NonZeroUsize;
use std::time::Duration;

/// Storage key holding the whole word collection.
pub const STORAGE_KEY: &str = "myWords";

/// How long a dictionary result stays usable.
pub const CACHE_EXPIRY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quiet period after the last page mutation before new content is scanned.
    pub debounce: Duration,
    /// Delay before a hovered marker opens or closes its panel.
    pub hover_delay: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: NonZeroUsize,
    /// Text nodes rewritten between yields back to the runtime.
    pub chunk_size: usize,
    /// Wait before the first full-page scan, giving the page time to settle.
    pub startup_delay: Duration,
    pub storage_key: String,
    pub marker_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            hover_delay: Duration::from_millis(300),
            cache_ttl: CACHE_EXPIRY,
            cache_capacity: NonZeroUsize::new(512).unwrap_or(NonZeroUsize::MIN),
            chunk_size: 64,
            startup_delay: Duration::from_secs(2),
            storage_key: STORAGE_KEY.to_string(),
            marker_tag: "span".to_string(),
        }
    }
}
