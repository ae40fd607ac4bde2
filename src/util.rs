use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch. Clock-before-epoch degrades to 0.
pub fn now_ts_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
