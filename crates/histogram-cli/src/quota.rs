use std::fs;
use std::io;
use std::path::Path;

use chrono::NaiveDate;

const MARKER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads the persisted "daily limit hit on this date" marker. An absent
/// or unparsable marker means no limit is recorded.
pub fn read_limit_date(path: &Path) -> Option<NaiveDate> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    NaiveDate::parse_from_str(line, MARKER_DATE_FORMAT).ok()
}

/// The daily quota is still active while `today <= stored`: a marker
/// written today blocks the rest of today and only clears once a full
/// calendar day has elapsed.
pub fn daily_limit_active(path: &Path, today: NaiveDate) -> bool {
    match read_limit_date(path) {
        Some(stored) => today <= stored,
        None => false,
    }
}

/// Overwrites the marker with `today`. Idempotent; atomic so an
/// interrupted run cannot leave a half-written date behind.
pub fn record_limit_date(path: &Path, today: NaiveDate) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, today.format(MARKER_DATE_FORMAT).to_string())?;
    fs::rename(&tmp_path, path)
}
