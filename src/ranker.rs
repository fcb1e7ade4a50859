//! Best-match selection among the full builds of a group

use crate::error::{Error, Result};
use crate::types::{BuildRecord, ConfigProfile};

/// Rank of a full build's config (lower is better)
fn rank(record: &BuildRecord) -> Result<ConfigProfile> {
    record.config().ok_or_else(|| Error::ConfigOrdering {
        reason: format!("build {} has no config profile", record.source_url),
    })
}

/// Select the most optimized full build
///
/// Returns the record with the lowest [`ConfigProfile`]. When several records
/// share that profile the first one in `records` wins.
///
/// # Errors
///
/// Returns [`Error::ConfigOrdering`] if `records` is empty or contains a
/// record that is not a full build. Callers are expected to pass a non-empty
/// group of full builds.
pub fn best(records: &[BuildRecord]) -> Result<&BuildRecord> {
    let mut best: Option<(&BuildRecord, ConfigProfile)> = None;

    for record in records {
        let profile = rank(record)?;
        match best {
            Some((_, current)) if current <= profile => {}
            _ => best = Some((record, profile)),
        }
    }

    best.map(|(record, _)| record)
        .ok_or_else(|| Error::ConfigOrdering {
            reason: "no candidate builds".to_string(),
        })
}
