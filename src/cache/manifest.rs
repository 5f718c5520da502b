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

use serde_json;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use cache::clean_repository;
use errors::*;
use util::{directory_size, native_path, Digest};

/// What a past compilation of one (compiler, command line, source) triple
/// included, and which object each observed set of header contents
/// produced.
///
/// `include_files` keeps the discovery order reported by the compiler;
/// `entries` maps the hash over those files' contents to the hash naming
/// the cached object. Entries accumulate as headers change over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "includeFiles")]
    pub include_files: Vec<String>,
    #[serde(rename = "entries")]
    pub entries: HashMap<String, String>,
}

impl Manifest {
    pub fn new() -> Manifest {
        Manifest {
            include_files: vec![],
            entries: HashMap::new(),
        }
    }

    /// Merge newly observed include files into the stored list, keeping
    /// first-seen order.
    pub fn merge_include_files(&mut self, paths: &[String]) {
        for path in paths {
            if !self.include_files.contains(path) {
                self.include_files.push(path.clone());
            }
        }
    }

    pub fn add_entry(&mut self, includes_content_hash: String, object_hash: String) {
        self.entries.insert(includes_content_hash, object_hash);
    }
}

/// The sharded on-disk map from manifest hash to `Manifest`, stored as
/// `<root>/<xx>/<hash>.json`.
#[derive(Debug, Clone)]
pub struct ManifestRepository {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ManifestSection {
    section_dir: PathBuf,
}

impl ManifestRepository {
    pub fn new(root: PathBuf) -> ManifestRepository {
        ManifestRepository { root: root }
    }

    pub fn section(&self, manifest_hash: &str) -> ManifestSection {
        ManifestSection { section_dir: self.root.join(&manifest_hash[..2]) }
    }

    pub fn size(&self) -> Result<u64> {
        directory_size(&self.root)
    }

    /// Evict manifests, oldest first, until the repository fits `target`
    /// bytes.
    pub fn clean(&self, target: u64) -> Result<u64> {
        clean_repository(&self.root, target)
    }

    /// The hash over an ordered list of per-file content hashes. Each
    /// element is framed, so neither reordering the list nor moving
    /// characters across element boundaries yields the same digest.
    pub fn includes_content_hash_for_hashes(hashes: &[String]) -> String {
        let mut digest = Digest::new();
        for hash in hashes {
            digest.update_framed(hash.as_bytes());
        }
        digest.finish()
    }

    /// Like `includes_content_hash_for_hashes`, hashing the current
    /// contents of the given files in order.
    pub fn includes_content_hash_for_files(files: &[String]) -> Result<String> {
        let mut hashes = Vec::with_capacity(files.len());
        for file in files {
            let path = native_path(file);
            if !Path::new(&path).is_file() {
                bail!(ErrorKind::IncludeNotFound(file.clone()));
            }
            hashes.push(Digest::file(&path)?);
        }
        Ok(Self::includes_content_hash_for_hashes(&hashes))
    }
}

impl ManifestSection {
    pub fn section_dir(&self) -> &Path {
        &self.section_dir
    }

    pub fn manifest_path(&self, manifest_hash: &str) -> PathBuf {
        self.section_dir.join(format!("{}.json", manifest_hash))
    }

    /// An absent manifest is a miss; a manifest that no longer parses is
    /// deleted and reported as a miss as well.
    pub fn get_manifest(&self, manifest_hash: &str) -> Result<Option<Manifest>> {
        let path = self.manifest_path(manifest_hash);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_reader(file) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!("discarding corrupt manifest {:?}: {}", path, e);
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Write `manifest`, committing with a rename so that readers only ever
    /// see a complete JSON document.
    pub fn set_manifest(&self, manifest_hash: &str, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(&self.section_dir)?;
        let path = self.manifest_path(manifest_hash);
        let mut tmp = NamedTempFile::new_in(&self.section_dir)?;
        serde_json::to_writer(&mut tmp, manifest)?;
        tmp.sync_all()?;
        if let Err(e) = tmp.persist(&path) {
            // Renaming over an existing manifest fails on some platforms;
            // replace it, serialized by the caller's cache lock.
            let _ = fs::remove_file(&path);
            e.file.persist(&path).map_err(|e| e.error)?;
        }
        Ok(())
    }
}
