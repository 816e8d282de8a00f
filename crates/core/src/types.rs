/// All timestamps are UTC epoch milliseconds.
pub type Millis = i64;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}

/// Convert a [`std::time::Duration`] to milliseconds, saturating at `i64::MAX`.
pub fn duration_millis(duration: std::time::Duration) -> Millis {
    Millis::try_from(duration.as_millis()).unwrap_or(Millis::MAX)
}
