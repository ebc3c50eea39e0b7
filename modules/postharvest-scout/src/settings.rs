use std::time::Duration;

use typed_builder::TypedBuilder;

/// Timing and threshold knobs for a harvest session. None of these are
/// correctness-critical; they trade capture latency against page load.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HarvestSettings {
    /// Quiet period after the last mutation batch before a scan runs.
    #[builder(default = Duration::from_millis(500))]
    pub debounce: Duration,
    /// Fallback scan cadence for mutations the notification channel missed.
    #[builder(default = Duration::from_secs(2))]
    pub periodic_scan: Duration,
    /// Wait after activating expansion controls before extracting.
    #[builder(default = Duration::from_millis(600))]
    pub expansion_settle: Duration,
    /// Delay before the one re-expansion attempt on a short capture.
    #[builder(default = Duration::from_millis(1500))]
    pub reexpansion_delay: Duration,
    #[builder(default = Duration::from_millis(1500))]
    pub scroll_tick: Duration,
    #[builder(default = 6)]
    pub max_stalls: u32,
    #[builder(default = Duration::from_secs(5))]
    pub stall_retry_delay: Duration,
    #[builder(default = 3)]
    pub max_retries: u32,
    /// Scroll distance per tick, as a fraction of the viewport height.
    #[builder(default = 0.8)]
    pub scroll_step: f64,
    /// A scroll that moves further than this many viewports is a jump.
    #[builder(default = 3.0)]
    pub jump_threshold: f64,
    /// Captures shorter than this (in characters) get one re-expansion.
    #[builder(default = 200)]
    pub short_capture_chars: usize,
    #[builder(default = true)]
    pub auto_scroll: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}
