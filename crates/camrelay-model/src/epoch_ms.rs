//! `SystemTime` as integer milliseconds since the Unix epoch.
//!
//! Times before the epoch are written as `0`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(at: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let ms = at
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    serializer.serialize_u64(ms)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
    let ms = u64::deserialize(deserializer)?;
    Ok(UNIX_EPOCH + Duration::from_millis(ms))
}
