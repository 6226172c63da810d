use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

/// Clock-derived query stamp that defeats intermediate caches.
///
/// Stamps are milliseconds since the epoch, bumped when needed so that each
/// one is strictly greater than the previous.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicU64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_stamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Appends `t=<stamp>` to `url`.
    pub fn apply(&self, url: &str) -> String {
        with_stamp(url, self.next_stamp())
    }
}

pub(crate) fn with_stamp(url: &str, stamp: u64) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let sep = if base.contains('?') { '&' } else { '?' };

    let mut out = format!("{base}{sep}t={stamp}");
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Caption published with each image: label plus local RFC 3339 time.
pub fn caption(label: &str, at: SystemTime) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let when = OffsetDateTime::from(at).to_offset(offset);
    match when.format(&Rfc3339) {
        Ok(stamp) => format!("{label} {stamp}"),
        Err(_) => format!("{label} @{}", when.unix_timestamp()),
    }
}
