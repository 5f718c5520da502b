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
use std::io;

error_chain! {
    foreign_links {
        Io(io::Error);
        Json(serde_json::Error);
    }

    errors {
        /// The cache lock could not be acquired within the configured
        /// interval. The lock file may be stale if a previous process died
        /// while holding it.
        LockTimeout(path: String) {
            description("timed out waiting for the cache lock")
            display("timed out waiting for the cache lock at {}", path)
        }
        /// An include file recorded in a manifest no longer exists on disk.
        IncludeNotFound(path: String) {
            description("include file from manifest is missing")
            display("include file from manifest is missing: {}", path)
        }
    }
}
