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

pub const DEFAULT_MAXIMUM_CACHE_SIZE: u64 = 1024 * 1024 * 1024;

/// The configured size never goes below this; a tiny budget would evict
/// entries while they are being written.
const MINIMUM_CACHE_SIZE: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ConfigData {
    #[serde(rename = "MaximumCacheSize", default = "default_maximum_cache_size")]
    maximum_cache_size: u64,
}

fn default_maximum_cache_size() -> u64 {
    DEFAULT_MAXIMUM_CACHE_SIZE
}

impl Default for ConfigData {
    fn default() -> ConfigData {
        ConfigData { maximum_cache_size: DEFAULT_MAXIMUM_CACHE_SIZE }
    }
}

/// Operator-tunable settings, persisted as JSON in the cache directory.
/// Mutations are written back when the value is dropped; callers mutate
/// under the cache lock.
#[derive(Debug)]
pub struct Configuration {
    path: PathBuf,
    data: ConfigData,
    dirty: bool,
}

impl Configuration {
    /// A missing or unreadable file yields the defaults.
    pub fn open(path: PathBuf) -> Result<Configuration> {
        let data = match File::open(&path) {
            Ok(f) => {
                match serde_json::from_reader(f) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("ignoring corrupt configuration {:?}: {}", path, e);
                        ConfigData::default()
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => ConfigData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Configuration {
            path: path,
            data: data,
            dirty: false,
        })
    }

    pub fn maximum_cache_size(&self) -> u64 {
        self.data.maximum_cache_size
    }

    pub fn set_maximum_cache_size(&mut self, size: u64) {
        self.data.maximum_cache_size = ::std::cmp::max(size, MINIMUM_CACHE_SIZE);
        self.dirty = true;
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let dir = self.path.parent().unwrap_or(&self.path);
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, &self.data)?;
        tmp.sync_all()?;
        if let Err(e) = tmp.persist(&self.path) {
            let _ = fs::remove_file(&self.path);
            e.file.persist(&self.path).map_err(|e| e.error)?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl Drop for Configuration {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.save() {
                warn!("failed to save configuration {:?}: {}", self.path, e);
            }
        }
    }
}
