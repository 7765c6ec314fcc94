use crate::error::Result;
use crate::store::CameraId;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// URL prefix under which snapshot files are served
pub const CAPTURES_URL_PREFIX: &str = "/captures";

/// Resolve configured timezone, falling back to UTC on parse errors
pub(crate) fn resolve_timestamp_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                "Invalid timestamp timezone '{}', falling back to UTC",
                tz_name
            );
            chrono_tz::UTC
        }
    }
}

/// Keep class names usable as a file name component
fn sanitize_class_name(class_name: &str) -> String {
    let cleaned: String = class_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Directory of annotated incident snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    timezone: Tz,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(root: P, timezone: &str) -> Self {
        Self {
            root: root.into(),
            timezone: resolve_timestamp_timezone(timezone),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `cam_{camera}_{class}_{YYYYmmdd_HHMMSS_micros}.jpg`
    pub fn file_name(&self, camera_id: CameraId, class_name: &str, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.timezone);
        format!(
            "cam_{}_{}_{}.jpg",
            camera_id,
            sanitize_class_name(class_name),
            local.format("%Y%m%d_%H%M%S_%6f")
        )
    }

    /// Write an encoded snapshot and return the public `image_path`
    pub async fn save(
        &self,
        camera_id: CameraId,
        class_name: &str,
        at: DateTime<Utc>,
        jpeg: &[u8],
    ) -> Result<String> {
        let file_name = self.file_name(camera_id, class_name, at);
        let file_path = self.root.join(&file_name);

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&file_path, jpeg).await?;

        debug!(
            "Saved snapshot {} ({} bytes)",
            file_path.display(),
            jpeg.len()
        );

        Ok(format!("{}/{}", CAPTURES_URL_PREFIX, file_name))
    }

    /// Map a public `image_path` back to a file inside the store
    pub fn resolve(&self, image_path: &str) -> Option<PathBuf> {
        let name = image_path
            .strip_prefix(CAPTURES_URL_PREFIX)?
            .trim_start_matches('/');

        let is_plain_name = !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && name != ".."
            && name != ".";

        is_plain_name.then(|| self.root.join(name))
    }

    /// Delete the file behind `image_path`; missing files are not an error
    pub async fn remove(&self, image_path: &str) -> Result<bool> {
        let Some(path) = self.resolve(image_path) else {
            warn!("Refusing to remove snapshot outside store: {}", image_path);
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
