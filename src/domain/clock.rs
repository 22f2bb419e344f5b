use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix milliseconds. Used to stamp provisional
/// messages; confirmed rows carry the server-assigned timestamp.
pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
