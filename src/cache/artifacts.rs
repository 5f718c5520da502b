// Copyright 2016 Mozilla Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempdir::TempDir;

use cache::clean_repository;
use errors::*;
use util::{directory_size, touch};

const OBJECT_FILE: &'static str = "object";
const STDOUT_FILE: &'static str = "stdout";
const STDERR_FILE: &'static str = "stderr";

/// One cached compilation result: the object file plus the compiler's
/// captured output. Written once, never mutated.
#[derive(Debug)]
pub struct CacheEntry {
    /// Path of the cached object file inside the repository.
    pub object: PathBuf,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The sharded on-disk map from object hash to `CacheEntry`, stored as
/// `<root>/<xx>/<hash>/{object,stdout,stderr}`.
#[derive(Debug, Clone)]
pub struct CompilerArtifactsRepository {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CompilerArtifactsSection {
    section_dir: PathBuf,
}

impl CompilerArtifactsRepository {
    pub fn new(root: PathBuf) -> CompilerArtifactsRepository {
        CompilerArtifactsRepository { root: root }
    }

    pub fn section(&self, object_hash: &str) -> CompilerArtifactsSection {
        CompilerArtifactsSection { section_dir: self.root.join(&object_hash[..2]) }
    }

    pub fn size(&self) -> Result<u64> {
        directory_size(&self.root)
    }

    /// Evict whole entries, least recently used first, until the
    /// repository fits `target` bytes.
    pub fn clean(&self, target: u64) -> Result<u64> {
        clean_repository(&self.root, target)
    }
}

impl CompilerArtifactsSection {
    pub fn section_dir(&self) -> &Path {
        &self.section_dir
    }

    pub fn cache_entry_dir(&self, object_hash: &str) -> PathBuf {
        self.section_dir.join(object_hash)
    }

    pub fn cached_object_path(&self, object_hash: &str) -> PathBuf {
        self.cache_entry_dir(object_hash).join(OBJECT_FILE)
    }

    pub fn has_entry(&self, object_hash: &str) -> bool {
        self.cached_object_path(object_hash).is_file()
    }

    /// Store a compilation result. The entry is assembled in a temporary
    /// directory and committed with a rename, so concurrent readers either
    /// see the whole entry or none of it. Identical keys hold identical
    /// content, so an entry that already exists is left untouched.
    pub fn set_entry(&self,
                     object_hash: &str,
                     object_file: &Path,
                     stdout: &[u8],
                     stderr: &[u8])
                     -> Result<()> {
        let entry_dir = self.cache_entry_dir(object_hash);
        if entry_dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.section_dir)?;
        let tmp = TempDir::new_in(&self.section_dir, "tmp")?;
        fs::copy(object_file, tmp.path().join(OBJECT_FILE)).chain_err(|| {
            format!("failed to copy object file {:?} into the cache", object_file)
        })?;
        write_synced(&tmp.path().join(STDOUT_FILE), stdout)?;
        write_synced(&tmp.path().join(STDERR_FILE), stderr)?;
        let tmp = tmp.into_path();
        match fs::rename(&tmp, &entry_dir) {
            Ok(()) => Ok(()),
            Err(_) if entry_dir.exists() => {
                // Another process committed the same entry first.
                let _ = fs::remove_dir_all(&tmp);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&tmp);
                Err(e.into())
            }
        }
    }

    /// Read an entry back. The object file's timestamp is refreshed so
    /// eviction sees the entry as recently used.
    pub fn get_entry(&self, object_hash: &str) -> Result<Option<CacheEntry>> {
        let object = self.cached_object_path(object_hash);
        if !object.is_file() {
            return Ok(None);
        }
        let entry_dir = self.cache_entry_dir(object_hash);
        let mut stdout = vec![];
        let mut stderr = vec![];
        File::open(entry_dir.join(STDOUT_FILE))?.read_to_end(&mut stdout)?;
        File::open(entry_dir.join(STDERR_FILE))?.read_to_end(&mut stderr)?;
        let _ = touch(&object);
        Ok(Some(CacheEntry {
            object: object,
            stdout: stdout,
            stderr: stderr,
        }))
    }

    /// Materialize the cached object at `destination`, replacing whatever
    /// is there. With `hardlink` the object is linked out of the cache
    /// instead of copied; modifying the destination then corrupts the
    /// cache, which is why hard links are opt-in.
    pub fn copy_object(&self,
                       object_hash: &str,
                       destination: &Path,
                       hardlink: bool)
                       -> Result<()> {
        let source = self.cached_object_path(object_hash);
        if destination.exists() {
            fs::remove_file(destination)?;
        }
        if hardlink {
            if fs::hard_link(&source, destination).is_ok() {
                return Ok(());
            }
            debug!("hard link to {:?} failed, copying instead", destination);
        }
        fs::copy(&source, destination).chain_err(|| {
            format!("failed to copy cached object to {:?}", destination)
        })?;
        Ok(())
    }
}

fn write_synced(path: &Path, contents: &[u8]) -> Result<()> {
    let mut f = File::create(path)?;
    f.write_all(contents)?;
    f.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    const KEY: &'static str = "fdde59862785f9f0ad6e661b9b5746b7";

    fn make_object(dir: &Path, contents: &[u8]) -> PathBuf {
        let path = dir.join("main.obj");
        File::create(&path).unwrap().write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_paths() {
        let root = PathBuf::from("cache-root");
        let repository = CompilerArtifactsRepository::new(root.clone());
        let section = repository.section(KEY);

        assert_eq!(section.section_dir(), root.join("fd"));
        assert_eq!(section.cached_object_path(KEY),
                   root.join("fd").join(KEY).join("object"));
    }

    #[test]
    fn test_set_and_get_entry() {
        let t = TempDir::new("artifacts-test").unwrap();
        let repository = CompilerArtifactsRepository::new(t.path().join("objects"));
        let object = make_object(t.path(), b"\x00OBJECT\x01DATA");

        let section = repository.section(KEY);
        assert!(!section.has_entry(KEY));
        section.set_entry(KEY, &object, b"main.cpp\n", b"warning: x\n").unwrap();
        assert!(section.has_entry(KEY));

        let entry = section.get_entry(KEY).unwrap().unwrap();
        assert_eq!(entry.stdout, b"main.cpp\n".to_vec());
        assert_eq!(entry.stderr, b"warning: x\n".to_vec());
        let mut cached = vec![];
        File::open(&entry.object).unwrap().read_to_end(&mut cached).unwrap();
        assert_eq!(cached, b"\x00OBJECT\x01DATA".to_vec());
    }

    #[test]
    fn test_absent_entry_is_a_miss() {
        let t = TempDir::new("artifacts-test").unwrap();
        let repository = CompilerArtifactsRepository::new(t.path().join("objects"));
        assert!(repository.section(KEY).get_entry(KEY).unwrap().is_none());
    }

    #[test]
    fn test_existing_entry_is_not_overwritten() {
        let t = TempDir::new("artifacts-test").unwrap();
        let repository = CompilerArtifactsRepository::new(t.path().join("objects"));
        let object = make_object(t.path(), b"first");
        let section = repository.section(KEY);
        section.set_entry(KEY, &object, b"out1", b"").unwrap();

        let other = make_object(t.path(), b"second");
        section.set_entry(KEY, &other, b"out2", b"").unwrap();

        let entry = section.get_entry(KEY).unwrap().unwrap();
        assert_eq!(entry.stdout, b"out1".to_vec());
    }

    #[test]
    fn test_copy_object_replaces_destination() {
        let t = TempDir::new("artifacts-test").unwrap();
        let repository = CompilerArtifactsRepository::new(t.path().join("objects"));
        let object = make_object(t.path(), b"cached bytes");
        let section = repository.section(KEY);
        section.set_entry(KEY, &object, b"", b"").unwrap();

        let destination = t.path().join("out.obj");
        File::create(&destination).unwrap().write_all(b"stale").unwrap();
        section.copy_object(KEY, &destination, false).unwrap();
        let mut copied = vec![];
        File::open(&destination).unwrap().read_to_end(&mut copied).unwrap();
        assert_eq!(copied, b"cached bytes".to_vec());

        // Hard linking produces the same contents.
        let destination = t.path().join("linked.obj");
        section.copy_object(KEY, &destination, true).unwrap();
        let mut linked = vec![];
        File::open(&destination).unwrap().read_to_end(&mut linked).unwrap();
        assert_eq!(linked, b"cached bytes".to_vec());
    }

    #[test]
    fn test_size_and_clean() {
        let t = TempDir::new("artifacts-test").unwrap();
        let repository = CompilerArtifactsRepository::new(t.path().join("objects"));
        let object = make_object(t.path(), &[0u8; 100]);

        let first = "fdde59862785f9f0ad6e661b9b5746b7";
        let second = "0623305942d216c165970948424ae7d1";
        repository.section(first).set_entry(first, &object, b"", b"").unwrap();
        repository.section(second).set_entry(second, &object, b"", b"").unwrap();
        assert_eq!(repository.size().unwrap(), 200);

        // One entry must go.
        let size = repository.clean(150).unwrap();
        assert_eq!(size, 100);
        assert_eq!(repository.size().unwrap(), 100);

        // Idempotent below the budget.
        let size = repository.clean(150).unwrap();
        assert_eq!(size, 100);

        let size = repository.clean(0).unwrap();
        assert_eq!(size, 0);
        assert_eq!(repository.size().unwrap(), 0);
    }

    #[test]
    fn test_clean_evicts_least_recently_used() {
        let t = TempDir::new("artifacts-test").unwrap();
        let repository = CompilerArtifactsRepository::new(t.path().join("objects"));
        let object = make_object(t.path(), &[0u8; 100]);

        let first = "fdde59862785f9f0ad6e661b9b5746b7";
        let second = "0623305942d216c165970948424ae7d1";
        repository.section(first).set_entry(first, &object, b"", b"").unwrap();
        repository.section(second).set_entry(second, &object, b"", b"").unwrap();

        // Make `first` the more recently used entry.
        ::std::thread::sleep(::std::time::Duration::from_millis(20));
        repository.section(first).get_entry(first).unwrap().unwrap();

        repository.clean(150).unwrap();
        assert!(repository.section(first).has_entry(first));
        assert!(!repository.section(second).has_entry(second));
    }
}
