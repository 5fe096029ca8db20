//! One-file-per-trajectory archive with a creation-ordered retention cap.
//!
//! Layout: `<dir>/<trajectory_id>.json`. Creation order comes from the
//! `ingest_seq` recorded inside each file. Neither `ingested_at` nor filesystem
//! timestamps decide which file is oldest.

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::error::StorageIoError;
use crate::obs;
use crate::trajectory::Trajectory;

const FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
struct ArchivedFile {
    key: (u64, DateTime<Utc>),
    trajectory_id: String,
}

/// Filesystem-backed trajectory archive.
///
/// Not internally synchronised; the ingestion pipeline owns it behind a mutex.
#[derive(Debug)]
pub struct TrajectoryArchive {
    dir: PathBuf,
    /// Oldest first.
    files: VecDeque<ArchivedFile>,
    next_seq: u64,
}

impl TrajectoryArchive {
    /// Open (creating if needed) `dir` and index the trajectories already in it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageIoError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageIoError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let mut files: Vec<ArchivedFile> = read_trajectories(&dir)?
            .into_iter()
            .map(|t| ArchivedFile {
                key: t.creation_key(),
                trajectory_id: t.trajectory_id,
            })
            .collect();
        files.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.trajectory_id.cmp(&b.trajectory_id))
        });
        let next_seq = files.iter().map(|f| f.key.0).max().map_or(1, |s| s + 1);

        tracing::debug!(dir = %dir.display(), files = files.len(), "opened trajectory archive");
        Ok(Self {
            dir,
            files: files.into(),
            next_seq,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of trajectory files currently indexed.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Ordinal the next accepted trajectory will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Reserve the next ingestion ordinal.
    pub fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn path_for(&self, trajectory_id: &str) -> PathBuf {
        self.dir.join(format!("{trajectory_id}.{FILE_EXTENSION}"))
    }

    /// Write `trajectory` to its own file.
    ///
    /// The write goes to a temp file in the same directory and is renamed into
    /// place, so a reader never observes a partial file.
    pub fn persist(&mut self, trajectory: &Trajectory) -> Result<PathBuf, StorageIoError> {
        let path = self.path_for(&trajectory.trajectory_id);
        let bytes = serde_json::to_vec_pretty(trajectory)?;

        let write_err = |source| StorageIoError::Write {
            path: path.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;

        self.files.retain(|f| f.trajectory_id != trajectory.trajectory_id);
        self.files.push_back(ArchivedFile {
            key: trajectory.creation_key(),
            trajectory_id: trajectory.trajectory_id.clone(),
        });
        Ok(path)
    }

    /// Delete the oldest files until at most `max_files` remain.
    ///
    /// Returns the ids removed. On failure the file that could not be deleted
    /// stays indexed and is retried by the next trim.
    pub fn trim(&mut self, max_files: usize) -> Result<Vec<String>, StorageIoError> {
        let mut removed = Vec::new();
        while self.files.len() > max_files {
            let Some(oldest) = self.files.front() else {
                break;
            };
            let path = self.path_for(&oldest.trajectory_id);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageIoError::Delete { path, source }),
            }
            if let Some(f) = self.files.pop_front() {
                removed.push(f.trajectory_id);
            }
        }
        Ok(removed)
    }

    /// Read one trajectory by id. `Ok(None)` when it is not archived.
    pub fn load(&self, trajectory_id: &str) -> Result<Option<Trajectory>, StorageIoError> {
        if !is_valid_id(trajectory_id) {
            return Ok(None);
        }
        let path = self.path_for(trajectory_id);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageIoError::Read { path, source }),
        };
        match serde_json::from_slice::<Trajectory>(&bytes) {
            Ok(t) => Ok(Some(t)),
            Err(e) => {
                obs::emit_archive_file_skipped(&path, &e);
                Ok(None)
            }
        }
    }

    /// Up to `limit` archived trajectories, newest first. Files that vanished,
    /// fail to parse, or fail digest verification are skipped.
    pub fn load_recent(&self, limit: usize) -> Result<Vec<Trajectory>, StorageIoError> {
        let mut out = Vec::new();
        for f in self.files.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let Some(t) = self.load(&f.trajectory_id)? else {
                continue;
            };
            if !t.verify_digest() {
                let path = self.path_for(&t.trajectory_id);
                obs::emit_archive_file_skipped(&path, &"payload digest mismatch");
                continue;
            }
            out.push(t);
        }
        Ok(out)
    }

    /// Ids currently indexed, oldest first.
    pub fn trajectory_ids(&self) -> Vec<String> {
        self.files.iter().map(|f| f.trajectory_id.clone()).collect()
    }
}

/// Ids are generated as `traj_<hex>`; anything with path separators is refused.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn read_trajectories(dir: &Path) -> Result<Vec<Trajectory>, StorageIoError> {
    let read_err = |source| StorageIoError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
            continue;
        }
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                obs::emit_archive_file_skipped(&path, &e);
                continue;
            }
        };
        match serde_json::from_slice::<Trajectory>(&bytes) {
            Ok(t) if path.file_stem().and_then(|s| s.to_str()) == Some(t.trajectory_id.as_str()) => {
                out.push(t)
            }
            Ok(_) => {
                obs::emit_archive_file_skipped(&path, &"file name does not match trajectory_id")
            }
            Err(e) => obs::emit_archive_file_skipped(&path, &e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::Scenario;

    fn make_archive() -> (tempfile::TempDir, TrajectoryArchive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = TrajectoryArchive::open(dir.path().join("trajectories")).unwrap();
        (dir, archive)
    }

    fn traj(archive: &mut TrajectoryArchive, name: &str) -> Trajectory {
        let scenario = Scenario {
            name: Some(name.to_string()),
            business_type: Some("saas".into()),
            novelty_score: Some(80.0),
            ..Default::default()
        };
        let seq = archive.allocate_seq();
        Trajectory::new("external_scenarios", name.to_string(), 0.8, seq, scenario).unwrap()
    }

    fn json_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref().unwrap().path().extension().and_then(|x| x.to_str()) == Some("json")
            })
            .count()
    }

    #[test]
    fn persist_and_load() {
        let (_dir, mut archive) = make_archive();
        let t = traj(&mut archive, "first");
        let path = archive.persist(&t).unwrap();
        assert!(path.ends_with(format!("{}.json", t.trajectory_id)));
        assert_eq!(archive.load(&t.trajectory_id).unwrap(), Some(t));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn trim_removes_oldest_first() {
        let (_dir, mut archive) = make_archive();
        let ids: Vec<String> = (0..5)
            .map(|i| {
                let t = traj(&mut archive, &format!("s{i}"));
                archive.persist(&t).unwrap();
                t.trajectory_id
            })
            .collect();

        let removed = archive.trim(3).unwrap();
        assert_eq!(removed, ids[..2].to_vec());
        assert_eq!(archive.trajectory_ids(), ids[2..].to_vec());
        assert_eq!(json_files(archive.dir()), 3);
    }

    #[test]
    fn reopen_rebuilds_order_from_file_contents() {
        let (dir, mut archive) = make_archive();
        let mut ids = Vec::new();
        for i in 0..4 {
            let t = traj(&mut archive, &format!("s{i}"));
            archive.persist(&t).unwrap();
            ids.push(t.trajectory_id);
        }
        drop(archive);

        let mut reopened = TrajectoryArchive::open(dir.path().join("trajectories")).unwrap();
        assert_eq!(reopened.trajectory_ids(), ids);
        assert_eq!(reopened.next_seq(), 5);
        assert_eq!(reopened.allocate_seq(), 5);
        assert_eq!(reopened.next_seq(), 6);

        let recent: Vec<_> = reopened
            .load_recent(2)
            .unwrap()
            .into_iter()
            .map(|t| t.trajectory_id)
            .collect();
        assert_eq!(recent, vec![ids[3].clone(), ids[2].clone()]);
    }

    #[test]
    fn reopen_orders_by_seq_when_clock_disagrees() {
        let (dir, mut archive) = make_archive();
        let mut ahead = traj(&mut archive, "ahead");
        ahead.ingested_at = ahead.ingested_at + chrono::Duration::days(1);
        archive.persist(&ahead).unwrap();
        let later = traj(&mut archive, "later");
        archive.persist(&later).unwrap();
        drop(archive);

        let mut reopened = TrajectoryArchive::open(dir.path().join("trajectories")).unwrap();
        assert_eq!(
            reopened.trajectory_ids(),
            vec![ahead.trajectory_id.clone(), later.trajectory_id.clone()]
        );
        assert_eq!(reopened.trim(1).unwrap(), vec![ahead.trajectory_id]);
    }

    #[test]
    fn foreign_and_corrupt_files_are_ignored() {
        let (dir, archive) = make_archive();
        let root = dir.path().join("trajectories");
        fs::write(root.join("notes.txt"), "hello").unwrap();
        fs::write(root.join("broken.json"), "{not json").unwrap();
        drop(archive);

        let reopened = TrajectoryArchive::open(&root).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn tampered_payload_is_skipped_on_load_recent() {
        let (_dir, mut archive) = make_archive();
        let mut t = traj(&mut archive, "tampered");
        archive.persist(&t).unwrap();
        t.raw_payload.novelty_score = Some(99.0);
        let path = archive.dir().join(format!("{}.json", t.trajectory_id));
        fs::write(&path, serde_json::to_vec(&t).unwrap()).unwrap();

        assert!(archive.load_recent(10).unwrap().is_empty());
    }

    #[test]
    fn load_refuses_path_like_ids() {
        let (_dir, archive) = make_archive();
        assert!(archive.load("../etc/passwd").unwrap().is_none());
        assert!(archive.load("missing").unwrap().is_none());
    }
}
