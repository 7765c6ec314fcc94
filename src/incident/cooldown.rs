use crate::store::CameraId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub camera_id: CameraId,
    pub class_name: String,
}

impl CooldownKey {
    pub fn new(camera_id: CameraId, class_name: &str) -> Self {
        Self {
            camera_id,
            class_name: class_name.to_string(),
        }
    }
}

/// Suppresses repeat incidents for one (camera, class) pair within a window.
///
/// Entries are created on first acceptance and never evicted; the table is
/// bounded by cameras x detectable classes.
#[derive(Debug)]
pub struct CooldownTracker {
    window: Duration,
    last_accepted: Mutex<HashMap<CooldownKey, Instant>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when nothing was accepted for this key within the window
    pub fn should_report(&self, camera_id: CameraId, class_name: &str, now: Instant) -> bool {
        let table = self.last_accepted.lock();
        Self::is_due(
            table.get(&CooldownKey::new(camera_id, class_name)),
            now,
            self.window,
        )
    }

    /// Record `now` as the last accepted time for this key
    pub fn mark_reported(&self, camera_id: CameraId, class_name: &str, now: Instant) {
        self.last_accepted
            .lock()
            .insert(CooldownKey::new(camera_id, class_name), now);
    }

    /// Check and record under one lock acquisition.
    ///
    /// Two concurrent callers for the same key cannot both get `true` inside
    /// one window.
    pub fn try_accept(&self, camera_id: CameraId, class_name: &str, now: Instant) -> bool {
        let key = CooldownKey::new(camera_id, class_name);
        let mut table = self.last_accepted.lock();

        if !Self::is_due(table.get(&key), now, self.window) {
            trace!(
                "Suppressing '{}' on camera {} (cooldown {:?})",
                class_name,
                camera_id,
                self.window
            );
            return false;
        }

        table.insert(key, now);
        true
    }

    /// Number of (camera, class) pairs seen so far
    pub fn tracked_keys(&self) -> usize {
        self.last_accepted.lock().len()
    }

    fn is_due(last: Option<&Instant>, now: Instant, window: Duration) -> bool {
        match last {
            None => true,
            // A `now` earlier than the stored time counts as zero elapsed
            Some(last) => now.saturating_duration_since(*last) >= window,
        }
    }
}
