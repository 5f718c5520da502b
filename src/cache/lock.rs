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

//! Mutual exclusion over a cache directory, across threads and across
//! processes.
//!
//! Within a process a per-cache-root node tracks the holding thread and a
//! re-entrancy count; the dispatcher routinely nests acquisitions (e.g.
//! statistics accounting inside a manifest update). The first acquisition
//! in a process also takes a lock file in the cache directory, which is
//! what other processes contend on. Acquisition is bounded; a timeout
//! names the lock file, since a stale file from a crashed process is the
//! usual culprit.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use errors::*;

const LOCK_FILE: &'static str = "cache.lock";

/// How long to sleep between attempts at creating the lock file.
const POLL_INTERVAL_MS: u64 = 50;

#[derive(Default)]
struct LockState {
    holder: Option<ThreadId>,
    count: usize,
}

#[derive(Default)]
struct LockNode {
    state: Mutex<LockState>,
    released: Condvar,
}

lazy_static! {
    static ref LOCK_NODES: Mutex<HashMap<PathBuf, Arc<LockNode>>> =
        Mutex::new(HashMap::new());
}

fn node_for(root: &Path) -> Arc<LockNode> {
    let mut nodes = LOCK_NODES.lock().unwrap();
    nodes.entry(root.to_owned())
        .or_insert_with(|| Arc::new(LockNode::default()))
        .clone()
}

/// A held cache lock; released (and the lock file removed, when this
/// process's count drops to zero) on drop, on every exit path.
pub struct CacheLock {
    node: Arc<LockNode>,
    lock_file: PathBuf,
}

impl CacheLock {
    pub fn acquire(cache_root: &Path, timeout: Duration) -> Result<CacheLock> {
        let node = node_for(cache_root);
        let lock_file = cache_root.join(LOCK_FILE);
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;

        let mut state = node.state.lock().unwrap();
        loop {
            match state.holder {
                Some(holder) if holder == me => {
                    state.count += 1;
                    break;
                }
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        bail!(ErrorKind::LockTimeout(lock_file.display().to_string()));
                    }
                    let (s, _) = node.released.wait_timeout(state, deadline - now).unwrap();
                    state = s;
                }
                None => {
                    // Claim the node before taking the cross-process lock
                    // file, so only one thread per process polls for it.
                    state.holder = Some(me);
                    state.count = 1;
                    drop(state);
                    match acquire_lock_file(&lock_file, deadline) {
                        Ok(()) => return Ok(CacheLock {
                            node: node,
                            lock_file: lock_file,
                        }),
                        Err(e) => {
                            let mut state = node.state.lock().unwrap();
                            state.holder = None;
                            state.count = 0;
                            drop(state);
                            node.released.notify_all();
                            return Err(e);
                        }
                    }
                }
            }
        }
        drop(state);
        Ok(CacheLock {
            node: node,
            lock_file: lock_file,
        })
    }
}

fn acquire_lock_file(lock_file: &Path, deadline: Instant) -> Result<()> {
    loop {
        match OpenOptions::new().write(true).create_new(true).open(lock_file) {
            Ok(_) => return Ok(()),
            Err(e) => {
                if Instant::now() >= deadline {
                    debug!("lock file {:?} still taken: {}", lock_file, e);
                    bail!(ErrorKind::LockTimeout(lock_file.display().to_string()));
                }
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let mut state = self.node.state.lock().unwrap();
        state.count -= 1;
        if state.count == 0 {
            state.holder = None;
            if let Err(e) = fs::remove_file(&self.lock_file) {
                warn!("failed to remove lock file {:?}: {}", self.lock_file, e);
            }
            drop(state);
            self.node.released.notify_all();
        }
    }
}
