//! Content fingerprints of calendar events
//!
//! Whenever this crate writes an event, it appends a signature of the written content to the event notes.
//! Later on, an event whose freshly computed signature still matches the embedded one has not been edited since we wrote it.
//! This does not rely on any in-memory state, and thus survives restarts and arbitrarily late change notifications.

use sha2::{Digest, Sha256};
use chrono::{DateTime, Utc};

/// Separates the user-visible notes from the embedded signature
pub const SIGNATURE_DELIMITER: &str = "\n\n#taskcal-signature:";

/// Number of hex characters of a signature
pub const SIGNATURE_LEN: usize = 16;

/// Compute the signature of the given event content
///
/// Alarm offsets are sorted, and any signature already embedded into `notes` is ignored, so that semantically identical events always get the same signature.
pub fn compute(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_all_day: bool,
    alarm_offsets: &[i64],
    notes: Option<&str>,
) -> String {
    let mut alarms = alarm_offsets.to_vec();
    alarms.sort_unstable();
    let alarms = alarms.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(",");
    let notes = notes.map(strip).unwrap_or_default();

    // Fields are separated by ASCII unit separators, so that no field can "leak" into its neighbour
    let canonical = format!(
        "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
        title,
        start.timestamp(),
        end.timestamp(),
        is_all_day,
        alarms,
        notes,
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..SIGNATURE_LEN].to_string()
}

/// Returns the signature embedded at the end of `notes`, if any
pub fn extract(notes: &str) -> Option<&str> {
    let pos = notes.rfind(SIGNATURE_DELIMITER)?;
    let candidate = &notes[pos + SIGNATURE_DELIMITER.len()..];
    if is_signature(candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Returns `notes` without its embedded signature
pub fn strip(notes: &str) -> &str {
    match extract(notes) {
        None => notes,
        Some(_) => {
            // extract() succeeded, so the delimiter is there
            let pos = notes.rfind(SIGNATURE_DELIMITER).unwrap_or(notes.len());
            &notes[..pos]
        },
    }
}

/// Returns `notes`, with its signature (if any) replaced by `signature`
pub fn embed(notes: Option<&str>, signature: &str) -> String {
    let user_notes = notes.map(strip).unwrap_or_default();
    format!("{}{}{}", user_notes, SIGNATURE_DELIMITER, signature)
}

fn is_signature(s: &str) -> bool {
    s.len() == SIGNATURE_LEN
        && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
