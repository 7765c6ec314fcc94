//! Cooldown, classification and recording of detections as incidents

mod cooldown;
mod recorder;
mod snapshot;
mod status;

pub use cooldown::{CooldownKey, CooldownTracker};
pub use recorder::{IncidentRecorder, RecordOutcome};
pub use snapshot::{SnapshotStore, CAPTURES_URL_PREFIX};
pub use status::{IncidentStatus, CONFIRM_THRESHOLD, TRASH_THRESHOLD};
