//! Snapshot files
//!
//! A snapshot file is a JSON array of flattened version records, one object
//! per row with the bookkeeping keys inlined. Saving goes through a temp
//! file in the target directory followed by a rename, so readers never see
//! a partially written snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{TimelineError, TimelineResult};
use crate::model::{FieldMap, VersionRecord};
use crate::observability::{log_event, Event};
use crate::query::{DateRange, VersionSet};

/// Writes `set` to `path`, replacing any existing file.
///
/// # Errors
///
/// `TL_BACKEND_FAILED` on any I/O failure. The temp file is removed and the
/// previous contents of `path` are left untouched.
pub fn save_snapshot(path: &Path, set: &VersionSet) -> TimelineResult<()> {
    let temp_path = temp_path_for(path)?;

    let result = write_rows(&temp_path, &set.to_field_maps()).and_then(|()| {
        fs::rename(&temp_path, path).map_err(|e| io_failure("rename snapshot to", path, e))
    });
    if result.is_err() {
        cleanup_temp(&temp_path);
        return result;
    }

    if let Some(dir) = parent_dir(path) {
        fsync_dir(dir)?;
    }

    let rows = set.len().to_string();
    let target = path.display().to_string();
    log_event(
        Event::SnapshotSaved,
        &[("path", target.as_str()), ("rows", rows.as_str())],
    );
    Ok(())
}

/// Reads a snapshot written by [`save_snapshot`] and binds it to `date`.
///
/// # Errors
///
/// - `TL_BACKEND_FAILED` if the file cannot be read
/// - `TL_FORMAT_INVALID` if it is not a JSON array of objects, or `date` is malformed
/// - `TL_VALIDATION_FAILED` if a row is not a well-formed version record
pub fn load_snapshot(path: &Path, date: Option<&str>) -> TimelineResult<VersionSet> {
    let range = DateRange::parse(date)?;

    let file = File::open(path).map_err(|e| io_failure("open snapshot", path, e))?;
    let rows: Vec<FieldMap> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        TimelineError::format(format!("snapshot {} is malformed: {}", path.display(), e))
    })?;

    let records = rows
        .into_iter()
        .map(VersionRecord::from_field_map)
        .collect::<TimelineResult<Vec<_>>>()?;

    let set = VersionSet::new(records, range);
    let rows = set.len().to_string();
    let source = path.display().to_string();
    log_event(
        Event::SnapshotLoaded,
        &[("path", source.as_str()), ("rows", rows.as_str())],
    );
    Ok(set)
}

fn write_rows(path: &Path, rows: &[FieldMap]) -> TimelineResult<()> {
    let file = File::create(path).map_err(|e| io_failure("create", path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, rows)
        .map_err(|e| TimelineError::backend(format!("encode snapshot: {}", e)))?;
    writer
        .flush()
        .map_err(|e| io_failure("write", path, e))?;

    // fsync is mandatory before the rename
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| io_failure("fsync", path, e))
}

fn temp_path_for(path: &Path) -> TimelineResult<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| TimelineError::validation(format!("{} is not a file path", path.display())))?;
    let temp_name = format!(
        ".{}.{}.tmp",
        name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    );
    Ok(path.with_file_name(temp_name))
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn fsync_dir(path: &Path) -> TimelineResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| io_failure("open directory", path, e))?;
    dir.sync_all()
        .map_err(|e| io_failure("fsync directory", path, e))
}

fn cleanup_temp(path: &Path) {
    if path.exists() {
        // Best effort, already on an error path
        let _ = fs::remove_file(path);
    }
}

fn io_failure(action: &str, path: &Path, err: std::io::Error) -> TimelineError {
    TimelineError::backend(format!("{} {}: {}", action, path.display(), err))
}
