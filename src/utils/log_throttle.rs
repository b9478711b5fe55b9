use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Windows untouched for this long are forgotten, keeping the map small when
/// keys are built from runtime values.
const IDLE_EVICTION: Duration = Duration::from_secs(600);
const EVICTION_THRESHOLD: usize = 256;

#[derive(Debug)]
struct Window {
    started_at: Instant,
    last_seen: Instant,
    suppressed: u64,
}

static WINDOWS: OnceLock<Mutex<HashMap<String, Window>>> = OnceLock::new();

/// Returns `Some(suppressed_count)` when a log for `key` should be emitted,
/// otherwise `None` and the event is counted as suppressed for the active window.
pub fn should_emit(key: &str, interval: Duration) -> Option<u64> {
    let mut windows = WINDOWS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let now = Instant::now();

    if windows.len() >= EVICTION_THRESHOLD {
        windows.retain(|_, w| now.duration_since(w.last_seen) < IDLE_EVICTION);
    }

    let Some(window) = windows.get_mut(key) else {
        windows.insert(
            key.to_string(),
            Window {
                started_at: now,
                last_seen: now,
                suppressed: 0,
            },
        );
        return Some(0);
    };

    window.last_seen = now;
    if now.duration_since(window.started_at) < interval {
        window.suppressed += 1;
        return None;
    }
    let suppressed = std::mem::take(&mut window.suppressed);
    window.started_at = now;
    Some(suppressed)
}
