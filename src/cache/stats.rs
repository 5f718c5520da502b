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
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use errors::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Counters {
    #[serde(rename = "CacheHits", default)]
    cache_hits: u64,
    #[serde(rename = "CacheMisses", default)]
    cache_misses: u64,
    #[serde(rename = "EvictedMisses", default)]
    evicted_misses: u64,
    #[serde(rename = "HeaderChangedMisses", default)]
    header_changed_misses: u64,
    #[serde(rename = "SourceChangedMisses", default)]
    source_changed_misses: u64,
    #[serde(rename = "CallsWithoutSourceFile", default)]
    calls_without_source_file: u64,
    #[serde(rename = "CallsWithMultipleSourceFiles", default)]
    calls_with_multiple_source_files: u64,
    #[serde(rename = "CallsForLinking", default)]
    calls_for_linking: u64,
    #[serde(rename = "CallsForPreprocessing", default)]
    calls_for_preprocessing: u64,
    #[serde(rename = "CallsWithPch", default)]
    calls_with_pch: u64,
    #[serde(rename = "CallsForExternalDebugInfo", default)]
    calls_for_external_debug_info: u64,
    #[serde(rename = "CallsWithInvalidArgument", default)]
    calls_with_invalid_argument: u64,
    #[serde(rename = "CallsWithUnsupportedEnvironment", default)]
    calls_with_unsupported_environment: u64,
}

/// Persistent counters describing what the wrapper did with every call.
/// Mutated under the cache lock and written back when dropped, so every
/// completed operation is counted exactly once.
///
/// Misses are partitioned: registering an evicted, header-changed or
/// source-changed miss also counts the plain miss, so the partitions always
/// sum up into `num_cache_misses`.
#[derive(Debug)]
pub struct Statistics {
    path: PathBuf,
    counters: Counters,
    dirty: bool,
}

impl Statistics {
    pub fn open(path: PathBuf) -> Result<Statistics> {
        let counters = match File::open(&path) {
            Ok(f) => {
                match serde_json::from_reader(f) {
                    Ok(counters) => counters,
                    Err(e) => {
                        warn!("ignoring corrupt statistics {:?}: {}", path, e);
                        Counters::default()
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Counters::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Statistics {
            path: path,
            counters: counters,
            dirty: false,
        })
    }

    pub fn register_cache_hit(&mut self) {
        self.counters.cache_hits += 1;
        self.dirty = true;
    }

    pub fn register_cache_miss(&mut self) {
        self.counters.cache_misses += 1;
        self.dirty = true;
    }

    pub fn register_evicted_miss(&mut self) {
        self.register_cache_miss();
        self.counters.evicted_misses += 1;
    }

    pub fn register_header_changed_miss(&mut self) {
        self.register_cache_miss();
        self.counters.header_changed_misses += 1;
    }

    pub fn register_source_changed_miss(&mut self) {
        self.register_cache_miss();
        self.counters.source_changed_misses += 1;
    }

    pub fn register_call_without_source_file(&mut self) {
        self.counters.calls_without_source_file += 1;
        self.dirty = true;
    }

    pub fn register_call_with_multiple_source_files(&mut self) {
        self.counters.calls_with_multiple_source_files += 1;
        self.dirty = true;
    }

    pub fn register_call_for_linking(&mut self) {
        self.counters.calls_for_linking += 1;
        self.dirty = true;
    }

    pub fn register_call_for_preprocessing(&mut self) {
        self.counters.calls_for_preprocessing += 1;
        self.dirty = true;
    }

    pub fn register_call_with_pch(&mut self) {
        self.counters.calls_with_pch += 1;
        self.dirty = true;
    }

    pub fn register_call_for_external_debug_info(&mut self) {
        self.counters.calls_for_external_debug_info += 1;
        self.dirty = true;
    }

    pub fn register_call_with_invalid_argument(&mut self) {
        self.counters.calls_with_invalid_argument += 1;
        self.dirty = true;
    }

    pub fn register_call_with_unsupported_environment(&mut self) {
        self.counters.calls_with_unsupported_environment += 1;
        self.dirty = true;
    }

    pub fn num_cache_hits(&self) -> u64 {
        self.counters.cache_hits
    }

    pub fn num_cache_misses(&self) -> u64 {
        self.counters.cache_misses
    }

    pub fn num_evicted_misses(&self) -> u64 {
        self.counters.evicted_misses
    }

    pub fn num_header_changed_misses(&self) -> u64 {
        self.counters.header_changed_misses
    }

    pub fn num_source_changed_misses(&self) -> u64 {
        self.counters.source_changed_misses
    }

    pub fn num_calls_without_source_file(&self) -> u64 {
        self.counters.calls_without_source_file
    }

    pub fn num_calls_with_multiple_source_files(&self) -> u64 {
        self.counters.calls_with_multiple_source_files
    }

    pub fn num_calls_for_linking(&self) -> u64 {
        self.counters.calls_for_linking
    }

    pub fn num_calls_for_preprocessing(&self) -> u64 {
        self.counters.calls_for_preprocessing
    }

    pub fn num_calls_with_pch(&self) -> u64 {
        self.counters.calls_with_pch
    }

    pub fn num_calls_for_external_debug_info(&self) -> u64 {
        self.counters.calls_for_external_debug_info
    }

    pub fn num_calls_with_invalid_argument(&self) -> u64 {
        self.counters.calls_with_invalid_argument
    }

    pub fn num_calls_with_unsupported_environment(&self) -> u64 {
        self.counters.calls_with_unsupported_environment
    }

    pub fn zero(&mut self) {
        self.counters = Counters::default();
        self.dirty = true;
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let dir = self.path.parent().unwrap_or(&self.path);
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &self.counters)?;
        tmp.sync_all()?;
        if let Err(e) = tmp.persist(&self.path) {
            let _ = fs::remove_file(&self.path);
            e.file.persist(&self.path).map_err(|e| e.error)?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl Drop for Statistics {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                warn!("failed to save statistics {:?}: {}", self.path, e);
            }
        }
    }
}
