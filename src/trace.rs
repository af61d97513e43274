//! Trace store: the append-only record of install-time side effects.
//!
//! Each component writes one JSON-lines file inside its trace directory. A
//! record is written with a single `write_all` of the full line and synced
//! before `append` returns, so a crash loses at most the record in flight.
//! Uninstall and the runtime checks only ever read this file; it is the sole
//! persisted state separating "installed" from "not installed".
//!
//! Records are never rewritten. Installing twice extends the log with a second
//! copy of the same effects.
//!
//! ```text
//! {"kind":"DIR_MADE","path":"/opt/stack/db"}
//! {"kind":"DIR_MADE","path":"/opt/stack/db/traces"}
//! {"kind":"PACKAGE_INSTALLED","name":"mysql-server","removable":true,"version":"5.7"}
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::error::{Result, StackError};
use crate::fs_ops::make_dirs_list;
use crate::types::{Action, ComponentKind};

/// Trace written by the installer and consumed by uninstall/runtime
pub const INSTALL_TRACE: &str = "install";

/// Kind tag of a trace record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceKind {
    PackageInstalled,
    DirMade,
}

/// One durable, write-once trace entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceRecord {
    PackageInstalled {
        name: String,
        removable: bool,
        version: String,
    },
    DirMade {
        path: PathBuf,
    },
}

impl TraceRecord {
    pub fn kind(&self) -> TraceKind {
        match self {
            Self::PackageInstalled { .. } => TraceKind::PackageInstalled,
            Self::DirMade { .. } => TraceKind::DirMade,
        }
    }
}

/// A package as recorded at install time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracedPackage {
    pub name: String,
    pub removable: bool,
    pub version: String,
}

pub fn trace_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.trace"))
}

/// Appends records to a component's trace.
///
/// The trace directory is created on the first append and every directory that
/// creation made is itself recorded ahead of the first record, so uninstall can
/// remove the trace area too. The first append also cuts off a torn final line
/// left by a crashed writer, so new records never land on the end of one.
#[derive(Debug)]
pub struct TraceWriter {
    dir: PathBuf,
    path: PathBuf,
    component: ComponentKind,
    // serializes writers within the process
    state: Mutex<WriterState>,
}

#[derive(Debug, Default)]
struct WriterState {
    prepared: bool,
    // created by this writer but not yet recorded
    unrecorded_dirs: Vec<PathBuf>,
}

impl TraceWriter {
    pub fn new(dir: impl Into<PathBuf>, name: &str, component: ComponentKind) -> Self {
        let dir = dir.into();
        let path = trace_file(&dir, name);
        Self {
            dir,
            path,
            component,
            state: Mutex::new(WriterState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one record. Returns only after the record is on disk.
    pub fn append(&self, record: TraceRecord) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| self.storage_error(io::Error::other("trace writer lock poisoned")))?;

        if !state.prepared {
            let created = make_dirs_list(&self.dir).map_err(|e| self.storage_error(e))?;
            state.unrecorded_dirs.extend(created);
            truncate_torn_tail(&self.path).map_err(|e| self.storage_error(e))?;
            state.prepared = true;
        }

        while let Some(path) = state.unrecorded_dirs.first().cloned() {
            self.write_line(&TraceRecord::DirMade { path })?;
            state.unrecorded_dirs.remove(0);
        }

        self.write_line(&record)
    }

    pub fn package_installed(&self, name: &str, removable: bool, version: &str) -> Result<()> {
        self.append(TraceRecord::PackageInstalled {
            name: name.to_string(),
            removable,
            version: version.to_string(),
        })
    }

    pub fn dirs_made(&self, dirs: &[PathBuf]) -> Result<()> {
        for path in dirs {
            self.append(TraceRecord::DirMade { path: path.clone() })?;
        }
        Ok(())
    }

    fn write_line(&self, record: &TraceRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| self.storage_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.storage_error(e))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| self.storage_error(e))?;

        debug!(component = %self.component, kind = %record.kind(), "trace record appended");
        Ok(())
    }

    fn storage_error(&self, source: io::Error) -> StackError {
        StackError::StorageFailure {
            action: Action::Install,
            component: self.component,
            path: self.path.clone(),
            source,
        }
    }
}

/// Drop an unterminated final line, the remains of a writer that died mid-record.
fn truncate_torn_tail(path: &Path) -> io::Result<()> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if raw.is_empty() || raw.ends_with(b"\n") {
        return Ok(());
    }

    let keep = raw.iter().rposition(|&b| b == b'\n').map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped_bytes = raw.len() - keep,
        "truncating torn final trace record"
    );
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    file.sync_data()
}

/// Reads a component's trace back in append order
#[derive(Debug, Clone)]
pub struct TraceReader {
    path: PathBuf,
    component: ComponentKind,
}

impl TraceReader {
    pub fn new(dir: impl AsRef<Path>, name: &str, component: ComponentKind) -> Self {
        Self {
            path: trace_file(dir.as_ref(), name),
            component,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Every record in append order. A missing trace reads as empty.
    pub fn read_all(&self, action: Action) -> Result<Vec<TraceRecord>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.storage_error(action, e)),
        };

        let complete = raw.ends_with('\n');
        let lines: Vec<&str> = raw.lines().collect();
        let mut records = Vec::with_capacity(lines.len());

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TraceRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if !complete && idx + 1 == lines.len() => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "ignoring torn final trace record"
                    );
                }
                Err(e) => {
                    return Err(self.storage_error(
                        action,
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("line {}: {e}", idx + 1),
                        ),
                    ));
                }
            }
        }
        Ok(records)
    }

    /// Records of one kind, in append order
    pub fn query(&self, kind: TraceKind, action: Action) -> Result<Vec<TraceRecord>> {
        Ok(self
            .read_all(action)?
            .into_iter()
            .filter(|r| r.kind() == kind)
            .collect())
    }

    pub fn packages_installed(&self, action: Action) -> Result<Vec<TracedPackage>> {
        Ok(self
            .query(TraceKind::PackageInstalled, action)?
            .into_iter()
            .filter_map(|r| match r {
                TraceRecord::PackageInstalled {
                    name,
                    removable,
                    version,
                } => Some(TracedPackage {
                    name,
                    removable,
                    version,
                }),
                TraceRecord::DirMade { .. } => None,
            })
            .collect())
    }

    pub fn dirs_made(&self, action: Action) -> Result<Vec<PathBuf>> {
        Ok(self
            .query(TraceKind::DirMade, action)?
            .into_iter()
            .filter_map(|r| match r {
                TraceRecord::DirMade { path } => Some(path),
                TraceRecord::PackageInstalled { .. } => None,
            })
            .collect())
    }

    fn storage_error(&self, action: Action, source: io::Error) -> StackError {
        StackError::StorageFailure {
            action,
            component: self.component,
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(dir: &Path) -> (TraceWriter, TraceReader) {
        (
            TraceWriter::new(dir, INSTALL_TRACE, ComponentKind::Db),
            TraceReader::new(dir, INSTALL_TRACE, ComponentKind::Db),
        )
    }

    #[test]
    fn test_missing_trace_reads_empty() {
        let root = tempfile::tempdir().unwrap();
        let (_, reader) = pair(&root.path().join("db/traces"));
        assert!(!reader.exists());
        assert!(reader.packages_installed(Action::Start).unwrap().is_empty());
        assert!(reader.dirs_made(Action::Uninstall).unwrap().is_empty());
    }

    #[test]
    fn test_first_append_records_created_trace_dirs() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("db").join("traces");
        let (writer, reader) = pair(&dir);

        writer.package_installed("mysql-server", true, "5.7").unwrap();

        assert_eq!(
            reader.dirs_made(Action::Uninstall).unwrap(),
            vec![root.path().join("db"), dir.clone()]
        );
        let records = reader.read_all(Action::Status).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].kind(), TraceKind::PackageInstalled);
    }

    #[test]
    fn test_appends_extend_never_overwrite() {
        let root = tempfile::tempdir().unwrap();
        let (writer, reader) = pair(root.path());

        writer.package_installed("a", true, "").unwrap();
        writer.package_installed("a", true, "").unwrap();

        let reopened = TraceWriter::new(root.path(), INSTALL_TRACE, ComponentKind::Db);
        reopened.package_installed("b", false, "1.0").unwrap();

        let names: Vec<String> = reader
            .packages_installed(Action::Uninstall)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_record_wire_format() {
        let line = serde_json::to_string(&TraceRecord::PackageInstalled {
            name: "mysql-server".into(),
            removable: true,
            version: "5.7".into(),
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"kind":"PACKAGE_INSTALLED","name":"mysql-server","removable":true,"version":"5.7"}"#
        );
    }

    #[test]
    fn test_torn_final_line_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let (writer, reader) = pair(root.path());
        writer.package_installed("a", true, "").unwrap();

        let mut file = OpenOptions::new().append(true).open(reader.path()).unwrap();
        file.write_all(br#"{"kind":"PACKAGE_INS"#).unwrap();

        assert_eq!(reader.packages_installed(Action::Uninstall).unwrap().len(), 1);
    }

    #[test]
    fn test_append_after_torn_line_keeps_trace_readable() {
        let root = tempfile::tempdir().unwrap();
        let (writer, reader) = pair(root.path());
        writer.package_installed("a", true, "").unwrap();

        let mut file = OpenOptions::new().append(true).open(reader.path()).unwrap();
        file.write_all(br#"{"kind":"PACKAGE_INS"#).unwrap();

        let retry = TraceWriter::new(root.path(), INSTALL_TRACE, ComponentKind::Db);
        retry.package_installed("b", true, "").unwrap();

        let names: Vec<String> = reader
            .packages_installed(Action::Uninstall)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_torn_only_line_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        let (writer, reader) = pair(root.path());
        fs::write(reader.path(), r#"{"kind":"DIR_"#).unwrap();

        writer.package_installed("a", true, "").unwrap();

        let records = reader.read_all(Action::Status).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), TraceKind::PackageInstalled);
    }

    #[test]
    fn test_created_dirs_recorded_after_failed_first_write() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("db").join("traces");
        // the trace file sits in a subdirectory the writer does not create
        let writer = TraceWriter::new(&dir, "late/install", ComponentKind::Db);

        assert!(matches!(
            writer.package_installed("a", true, "").unwrap_err(),
            StackError::StorageFailure { .. }
        ));
        assert!(dir.is_dir());

        fs::create_dir(dir.join("late")).unwrap();
        writer.package_installed("a", true, "").unwrap();

        let reader = TraceReader::new(&dir, "late/install", ComponentKind::Db);
        assert_eq!(
            reader.dirs_made(Action::Uninstall).unwrap(),
            vec![root.path().join("db"), dir.clone()]
        );
    }

    #[test]
    fn test_corrupt_middle_line_is_storage_failure() {
        let root = tempfile::tempdir().unwrap();
        let (_, reader) = pair(root.path());
        fs::write(reader.path(), "garbage\n{\"kind\":\"DIR_MADE\",\"path\":\"/x\"}\n").unwrap();

        let err = reader.read_all(Action::Uninstall).unwrap_err();
        assert!(matches!(
            err,
            StackError::StorageFailure {
                action: Action::Uninstall,
                ..
            }
        ));
    }

    #[test]
    fn test_unwritable_medium_fails_append() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, "not a dir").unwrap();
        let writer = TraceWriter::new(blocker.join("traces"), INSTALL_TRACE, ComponentKind::Db);

        let err = writer.package_installed("a", true, "").unwrap_err();
        assert!(matches!(err, StackError::StorageFailure { .. }));
    }
}
