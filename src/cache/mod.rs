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

pub mod artifacts;
pub mod config;
pub mod lock;
pub mod manifest;
pub mod stats;

use directories::ProjectDirs;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cache::artifacts::CompilerArtifactsRepository;
use cache::config::Configuration;
use cache::lock::CacheLock;
use cache::manifest::ManifestRepository;
use cache::stats::Statistics;
use errors::*;
use util::{directory_size, files_beneath};

const CONFIG_FILE: &'static str = "config.json";
const STATS_FILE: &'static str = "stats.json";

/// How long a process waits for the cache lock before giving up.
const CACHE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// The cache directory and the repositories inside it. A `Cache` is a
/// value-typed handle; cloning it does not duplicate any on-disk state.
#[derive(Clone)]
pub struct Cache {
    root: PathBuf,
    manifests: ManifestRepository,
    artifacts: CompilerArtifactsRepository,
}

impl Cache {
    pub fn new(root: PathBuf) -> Result<Cache> {
        fs::create_dir_all(&root)
            .chain_err(|| format!("failed to create cache directory {:?}", root))?;
        let manifests = ManifestRepository::new(root.join("manifests"));
        let artifacts = CompilerArtifactsRepository::new(root.join("objects"));
        Ok(Cache {
            root: root,
            manifests: manifests,
            artifacts: artifacts,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifests(&self) -> &ManifestRepository {
        &self.manifests
    }

    pub fn artifacts(&self) -> &CompilerArtifactsRepository {
        &self.artifacts
    }

    pub fn configuration(&self) -> Result<Configuration> {
        Configuration::open(self.root.join(CONFIG_FILE))
    }

    pub fn statistics(&self) -> Result<Statistics> {
        Statistics::open(self.root.join(STATS_FILE))
    }

    /// Acquire the cross-process lock for this cache directory.
    pub fn lock(&self) -> Result<CacheLock> {
        CacheLock::acquire(&self.root, CACHE_LOCK_TIMEOUT)
    }
}

/// The cache directory: `CLCACHE_DIR` if set, the user's cache directory
/// otherwise.
pub fn cache_root_from_env() -> PathBuf {
    match env::var_os("CLCACHE_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let dirs = ProjectDirs::from("", "", "clcache");
            dirs.cache_dir().to_owned()
        }
    }
}

struct RepositoryEntry {
    path: PathBuf,
    size: u64,
    mtime: SystemTime,
    is_dir: bool,
}

/// Delete least-recently-used entries below `root` until the repository
/// size is at most `target` bytes, returning the resulting size.
///
/// Entries live directly below the two-character shard directories and are
/// either single files or whole entry directories. For a directory the
/// payload is removed before the directory itself, so an interrupted
/// deletion leaves an empty directory that is ignored (and reaped on the
/// next clean) rather than a half-usable entry.
pub fn clean_repository(root: &Path, target: u64) -> Result<u64> {
    let mut entries = vec![];
    let mut total = 0;
    if root.is_dir() {
        for shard in fs::read_dir(root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let path = entry.path();
                let entry = if entry.file_type()?.is_dir() {
                    directory_entry(path)?
                } else {
                    let metadata = entry.metadata()?;
                    RepositoryEntry {
                        path: path,
                        size: metadata.len(),
                        mtime: metadata.modified().unwrap_or(UNIX_EPOCH),
                        is_dir: false,
                    }
                };
                total += entry.size;
                entries.push(entry);
            }
        }
    }

    entries.sort_by_key(|e| e.mtime);
    for entry in entries {
        if total <= target {
            break;
        }
        debug!("evicting {:?} ({} bytes)", entry.path, entry.size);
        if entry.is_dir {
            for file in files_beneath(&entry.path)? {
                fs::remove_file(&file)?;
            }
            fs::remove_dir_all(&entry.path)?;
        } else {
            fs::remove_file(&entry.path)?;
        }
        total -= entry.size;
    }

    // Shard directories left empty are harmless; reap them quietly.
    if root.is_dir() {
        for shard in fs::read_dir(root)? {
            let _ = fs::remove_dir(shard?.path());
        }
    }
    Ok(total)
}

/// An entry directory's LRU timestamp is its most recently used file, which
/// the repositories touch on every cache hit.
fn directory_entry(path: PathBuf) -> Result<RepositoryEntry> {
    let mut size = 0;
    let mut mtime = UNIX_EPOCH;
    for file in files_beneath(&path)? {
        let metadata = fs::metadata(&file)?;
        size += metadata.len();
        let file_mtime = metadata.modified().unwrap_or(UNIX_EPOCH);
        if file_mtime > mtime {
            mtime = file_mtime;
        }
    }
    Ok(RepositoryEntry {
        path: path,
        size: size,
        mtime: mtime,
        is_dir: true,
    })
}
