//! Stable identity for feed entries.
//!
//! The key only collides when the normalized title and the full precision
//! publication timestamp are both identical. Near-duplicate titles or
//! timestamps a few seconds apart produce different keys.

use chrono::{DateTime, Timelike, Utc};
use md5::{Digest, Md5};

/// Render a timestamp as ISO-8601 without a timezone suffix. Fractional
/// seconds are only included when present.
pub fn canonical_timestamp(pub_date: DateTime<Utc>) -> String {
    let naive = pub_date.naive_utc();
    if naive.nanosecond() == 0 {
        naive.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        naive.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Hex-encoded MD5 of `"{normalized title}_{timestamp}"`.
pub fn compute_key(title: &str, pub_date: DateTime<Utc>) -> String {
    let raw = format!(
        "{}_{}",
        title.trim().to_lowercase(),
        canonical_timestamp(pub_date)
    );
    hex::encode(Md5::digest(raw.as_bytes()))
}
