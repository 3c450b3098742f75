//! Fixture file stager: copy, directory copy/move, and directory deletion.
//!
//! The stager is the only writer into the staging directory. Every write to a
//! given destination path happens under that path's lock, so delete+copy is a
//! single critical section and a reader never sees a half-replaced file from
//! two racing stagers. Distinct destinations never contend.
//!
//! Source contents are read fully before the destination is touched: a
//! missing or unreadable fixture aborts the copy with the destination intact.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::core::errors::{FixtureError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::stager::plan::StagingOp;

/// Options for [`Stager::copy_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Delete each source file after copying, then the emptied source directory.
    pub remove_source: bool,
    /// Replace destination files that already exist.
    pub overwrite: bool,
}

/// Result of one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub dest: PathBuf,
    pub bytes: u64,
    /// Hex SHA-256 of the bytes written.
    pub sha256: String,
}

/// Named mutual-exclusion regions keyed by destination path.
#[derive(Debug, Default)]
struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock();
        Arc::clone(map.entry(path.to_path_buf()).or_default())
    }
}

/// Copies fixture files into the staging directory.
#[derive(Clone, Default)]
pub struct Stager {
    locks: Arc<PathLocks>,
    logger: Option<ActivityLoggerHandle>,
}

impl Stager {
    pub fn new(logger: Option<ActivityLoggerHandle>) -> Self {
        Self {
            locks: Arc::new(PathLocks::default()),
            logger,
        }
    }

    /// Replace `dest` with a byte-for-byte copy of `source`.
    ///
    /// Fails with `FixtureMissing` if `source` does not exist; the stager does
    /// not retry.
    pub fn copy_file(&self, source: &Path, dest: &Path) -> Result<StagedFile> {
        self.copy_locked(source, dest, true)
    }

    /// Run a step's copy operations in order, stopping at the first failure.
    pub fn stage(&self, ops: &[StagingOp]) -> Result<Vec<StagedFile>> {
        ops.iter()
            .map(|op| self.copy_file(&op.source, &op.dest))
            .collect()
    }

    /// Copy every immediate file of `source_dir` into `dest_dir` (non-recursive).
    ///
    /// `dest_dir` is created if absent. Without `overwrite`, an existing
    /// destination file fails the whole call before anything is copied.
    /// Returns the number of files copied.
    pub fn copy_directory(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
        options: CopyOptions,
    ) -> Result<usize> {
        if !source_dir.is_dir() {
            return Err(FixtureError::FixtureMissing {
                path: source_dir.to_path_buf(),
            });
        }
        fs::create_dir_all(dest_dir).map_err(|e| FixtureError::io(dest_dir, e))?;

        let files = immediate_files(source_dir)?;

        if !options.overwrite
            && let Some(clash) = files
                .iter()
                .filter_map(|f| f.file_name())
                .map(|name| dest_dir.join(name))
                .find(|dest| dest.exists())
        {
            return Err(FixtureError::DestinationExists { path: clash });
        }

        for source in &files {
            let Some(name) = source.file_name() else {
                continue;
            };
            self.copy_locked(source, &dest_dir.join(name), options.overwrite)?;
            if options.remove_source {
                fs::remove_file(source).map_err(|e| FixtureError::io(source, e))?;
            }
        }

        if options.remove_source {
            fs::remove_dir(source_dir).map_err(|e| FixtureError::io(source_dir, e))?;
        }

        self.emit(ActivityEvent::DirectoryCopied {
            source: source_dir.to_path_buf(),
            dest: dest_dir.to_path_buf(),
            files: files.len(),
            source_removed: options.remove_source,
        });
        Ok(files.len())
    }

    /// Clear read-only bits on and delete every file in `dir`, then remove `dir`.
    ///
    /// Returns the number of files deleted. Subdirectories are not descended
    /// into, so their presence fails the call with `DirectoryNotEmpty`.
    pub fn delete_directory(&self, dir: &Path) -> Result<usize> {
        let files = immediate_files(dir)?;

        for file in &files {
            let lock = self.locks.lock_for(file);
            let _guard = lock.lock();
            clear_readonly(file).map_err(|source| FixtureError::DestinationLocked {
                path: file.clone(),
                source,
            })?;
            fs::remove_file(file).map_err(|source| FixtureError::DestinationLocked {
                path: file.clone(),
                source,
            })?;
        }

        if let Err(source) = fs::remove_dir(dir) {
            let non_empty = fs::read_dir(dir)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            return Err(if non_empty {
                FixtureError::DirectoryNotEmpty {
                    path: dir.to_path_buf(),
                }
            } else {
                FixtureError::io(dir, source)
            });
        }

        self.emit(ActivityEvent::DirectoryDeleted {
            path: dir.to_path_buf(),
            files: files.len(),
        });
        Ok(files.len())
    }

    // ──────────────────── internals ────────────────────

    fn copy_locked(&self, source: &Path, dest: &Path, overwrite: bool) -> Result<StagedFile> {
        let lock = self.locks.lock_for(dest);
        let _guard = lock.lock();

        if !source.is_file() {
            return Err(FixtureError::FixtureMissing {
                path: source.to_path_buf(),
            });
        }
        let content = fs::read(source).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                FixtureError::FixtureMissing {
                    path: source.to_path_buf(),
                }
            } else {
                FixtureError::io(source, e)
            }
        })?;

        if fs::symlink_metadata(dest).is_ok() {
            if !overwrite {
                return Err(FixtureError::DestinationExists {
                    path: dest.to_path_buf(),
                });
            }
            clear_readonly(dest)
                .and_then(|()| fs::remove_file(dest))
                .map_err(|source| FixtureError::DestinationLocked {
                    path: dest.to_path_buf(),
                    source,
                })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .map_err(|e| FixtureError::io(dest, e))?;
        file.write_all(&content)
            .and_then(|()| file.sync_all())
            .map_err(|e| FixtureError::io(dest, e))?;

        let staged = StagedFile {
            dest: dest.to_path_buf(),
            bytes: content.len() as u64,
            sha256: sha256_hex(&content),
        };
        self.emit(ActivityEvent::FileStaged {
            source: source.to_path_buf(),
            dest: staged.dest.clone(),
            bytes: staged.bytes,
            sha256: staged.sha256.clone(),
        });
        Ok(staged)
    }

    fn emit(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn immediate_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| FixtureError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FixtureError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| FixtureError::io(entry.path(), e))?;
        if !file_type.is_dir() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn clear_readonly(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    if !perms.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    Sha256::digest(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    fn write(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn copy_file_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src").join("Data.xml");
        let dst = dir.path().join("stage").join("Data.xml");
        write(&src, b"<Result>Pass</Result>");
        write(&dst, b"<Result>old and much longer content</Result>");

        let staged = Stager::default().copy_file(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"<Result>Pass</Result>");
        assert_eq!(staged.bytes, 21);
        assert_eq!(staged.sha256, sha256_hex(b"<Result>Pass</Result>"));
    }

    #[test]
    fn missing_source_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("CAP.tab");
        write(&dst, b"previous");

        let err = Stager::default()
            .copy_file(&dir.path().join("absent.tab"), &dst)
            .unwrap_err();
        assert_eq!(err.code(), "MDL-2001");
        assert_eq!(fs::read(&dst).unwrap(), b"previous");
    }

    #[cfg(unix)]
    #[test]
    fn copy_file_overwrites_read_only_destination() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a");
        let dst = dir.path().join("b");
        write(&src, b"new");
        write(&dst, b"old");
        fs::set_permissions(&dst, fs::Permissions::from_mode(0o444)).unwrap();

        Stager::default().copy_file(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn concurrent_copies_to_same_destination_never_tear() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let dst = dir.path().join("out.bin");
        write(&a, &vec![b'a'; 64 * 1024]);
        write(&b, &vec![b'b'; 32 * 1024]);

        let stager = Stager::default();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stager = stager.clone();
                let src = if i % 2 == 0 { a.clone() } else { b.clone() };
                let dst = dst.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        stager.copy_file(&src, &dst).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let out = fs::read(&dst).unwrap();
        assert!(out == fs::read(&a).unwrap() || out == fs::read(&b).unwrap());
    }

    #[test]
    fn stage_stops_at_first_missing_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let cap = dir.path().join("fx").join("CAP.tab");
        write(&cap, b"cap");
        let stage = dir.path().join("stage");
        fs::create_dir_all(&stage).unwrap();

        let ops = vec![
            StagingOp {
                source: cap,
                dest: stage.join("CAP.tab"),
            },
            StagingOp {
                source: dir.path().join("fx").join("TUNE.tab"),
                dest: stage.join("TUNE.tab"),
            },
        ];
        let err = Stager::default().stage(&ops).unwrap_err();
        assert_eq!(err.code(), "MDL-2001");
        assert!(stage.join("CAP.tab").exists());
        assert!(!stage.join("TUNE.tab").exists());
    }

    #[test]
    fn copy_directory_without_overwrite_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("one.mat"), b"1");
        write(&src.join("two.mat"), b"2");
        write(&dst.join("two.mat"), b"keep me");

        let err = Stager::default()
            .copy_directory(&src, &dst, CopyOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "MDL-2003");
        assert_eq!(fs::read(dst.join("two.mat")).unwrap(), b"keep me");
        assert!(!dst.join("one.mat").exists());
    }

    #[test]
    fn copy_directory_with_overwrite_matches_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write(&src.join("one.mat"), b"1");
        write(&src.join("two.mat"), b"2");
        write(&dst.join("two.mat"), b"stale");
        fs::create_dir_all(src.join("nested")).unwrap();

        let copied = Stager::default()
            .copy_directory(
                &src,
                &dst,
                CopyOptions {
                    overwrite: true,
                    ..CopyOptions::default()
                },
            )
            .unwrap();
        assert_eq!(copied, 2);
        assert_eq!(fs::read(dst.join("one.mat")).unwrap(), b"1");
        assert_eq!(fs::read(dst.join("two.mat")).unwrap(), b"2");
        assert!(!dst.join("nested").exists());
    }

    #[test]
    fn copy_directory_creates_destination_and_moves() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("deep").join("dst");
        write(&src.join("Data.xml"), b"<x/>");

        Stager::default()
            .copy_directory(
                &src,
                &dst,
                CopyOptions {
                    remove_source: true,
                    overwrite: false,
                },
            )
            .unwrap();
        assert_eq!(fs::read(dst.join("Data.xml")).unwrap(), b"<x/>");
        assert!(!src.exists());
    }

    #[test]
    fn copy_directory_missing_source_is_fixture_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Stager::default()
            .copy_directory(
                &dir.path().join("nope"),
                &dir.path().join("dst"),
                CopyOptions::default(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "MDL-2001");
    }

    #[cfg(unix)]
    #[test]
    fn delete_directory_clears_read_only_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("buffer");
        write(&target.join("a.mat"), b"a");
        write(&target.join(".hidden"), b"h");
        fs::set_permissions(target.join("a.mat"), fs::Permissions::from_mode(0o444)).unwrap();

        let deleted = Stager::default().delete_directory(&target).unwrap();
        assert_eq!(deleted, 2);
        assert!(!target.exists());
    }

    #[test]
    fn delete_directory_with_subdirectory_is_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("buffer");
        write(&target.join("a.mat"), b"a");
        fs::create_dir_all(target.join("sub")).unwrap();

        let err = Stager::default().delete_directory(&target).unwrap_err();
        assert_eq!(err.code(), "MDL-2004");
        assert!(!target.join("a.mat").exists());
    }

    #[test]
    fn delete_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Stager::default()
            .delete_directory(&dir.path().join("gone"))
            .unwrap_err();
        assert_eq!(err.code(), "MDL-2101");
    }

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    proptest! {
        #[test]
        fn copy_file_is_idempotent(content in proptest::collection::vec(any::<u8>(), 1..2048)) {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("src.bin");
            let dst = dir.path().join("dst.bin");
            fs::write(&src, &content).unwrap();

            let stager = Stager::default();
            let first = stager.copy_file(&src, &dst).unwrap();
            let second = stager.copy_file(&src, &dst).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(fs::read(&dst).unwrap(), content);
        }
    }
}
