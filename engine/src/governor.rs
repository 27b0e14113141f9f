use std::collections::{HashMap, VecDeque};

/// Default provider budget: 50 calls per rolling-fixed 60 s window.
pub const DEFAULT_MAX_CALLS: u32 = 50;
pub const DEFAULT_WINDOW_MS: f64 = 60_000.0;

const RECENT_OUTCOME_CAP: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    NotFound,
    ProviderError,
    Timeout,
    RateLimited,
}

#[derive(Debug, Clone, Copy)]
pub struct GovernorLimit {
    pub max_calls: u32,
    pub window_ms: f64,
}

impl Default for GovernorLimit {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub provider: String,
    pub outcome: CallOutcome,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct FixedWindow {
    started_ms: f64,
    used: u32,
}

/// Bounds outbound lookup calls per provider with a fixed-window counter and
/// keeps a capped ring of recent call outcomes for display. Denial is a
/// caller-visible boolean; the governor never retries or queues on its own.
#[derive(Debug, Default)]
pub struct RateGovernor {
    limits: HashMap<String, GovernorLimit>,
    windows: HashMap<String, FixedWindow>,
    recent: VecDeque<CallRecord>,
}

impl RateGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limit(&mut self, provider: &str, limit: GovernorLimit) {
        self.limits.insert(provider.to_string(), limit);
    }

    /// Whether a call may go out now. Counts the call when allowed.
    pub fn try_acquire(&mut self, provider: &str, now_ms: f64) -> bool {
        let limit = self.limits.get(provider).copied().unwrap_or_default();
        let window = self
            .windows
            .entry(provider.to_string())
            .or_insert(FixedWindow {
                started_ms: now_ms,
                used: 0,
            });

        if now_ms - window.started_ms >= limit.window_ms {
            window.started_ms = now_ms;
            window.used = 0;
        }

        if window.used >= limit.max_calls {
            return false;
        }
        window.used += 1;
        true
    }

    /// Observability only; no behavioral effect on admission.
    pub fn record(&mut self, provider: &str, outcome: CallOutcome, duration_ms: f64) {
        self.recent.push_back(CallRecord {
            provider: provider.to_string(),
            outcome,
            duration_ms,
        });
        while self.recent.len() > RECENT_OUTCOME_CAP {
            self.recent.pop_front();
        }
    }

    pub fn recent(&self) -> impl Iterator<Item = &CallRecord> {
        self.recent.iter()
    }
}
