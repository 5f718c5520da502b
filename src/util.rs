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

use byteorder::{ByteOrder, LittleEndian};
use crypto::digest::Digest as DigestImpl;
use crypto::md5::Md5;
use filetime::{self, FileTime};
use std::env;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time;

use errors::*;

/// Content hasher producing 32-character lowercase hex digests. Keys in
/// both repositories are exactly such digests.
pub struct Digest {
    inner: Md5,
}

impl Digest {
    pub fn new() -> Digest {
        Digest { inner: Md5::new() }
    }

    /// Calculate the digest of the contents of `path`.
    pub fn file<T: AsRef<Path>>(path: T) -> Result<String> {
        let path = path.as_ref();
        let mut f = File::open(path)
            .chain_err(|| format!("failed to open file for hashing: {:?}", path))?;
        let mut d = Digest::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            let count = f.read(&mut buf)?;
            if count == 0 {
                break;
            }
            d.update(&buf[..count]);
        }
        Ok(d.finish())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.input(bytes);
    }

    /// Add `bytes` preceded by its length, so that composed inputs cannot be
    /// repartitioned or reordered without changing the resulting digest.
    pub fn update_framed(&mut self, bytes: &[u8]) {
        let mut len = [0u8; 8];
        LittleEndian::write_u64(&mut len, bytes.len() as u64);
        self.inner.input(&len);
        self.inner.input(bytes);
    }

    pub fn finish(mut self) -> String {
        self.inner.result_str()
    }
}

/// All regular files below `dir`, in no particular order. Missing
/// directories yield an empty list, matching an empty repository.
pub fn files_beneath(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    if !dir.is_dir() {
        return Ok(files);
    }
    let mut pending = vec![dir.to_owned()];
    while let Some(d) = pending.pop() {
        for entry in fs::read_dir(&d)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// Sum of the sizes of all files below `dir`.
pub fn directory_size(dir: &Path) -> Result<u64> {
    let mut size = 0;
    for file in files_beneath(dir)? {
        size += fs::metadata(&file)?.len();
    }
    Ok(size)
}

/// Update a file's access and modification time to now. Used to make the
/// filesystem mtime usable as an LRU clock for eviction.
pub fn touch(path: &Path) -> io::Result<()> {
    let now = time::SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .unwrap_or(time::Duration::new(0, 0));
    let t = FileTime::from_seconds_since_1970(now.as_secs(), now.subsec_nanos());
    filetime::set_file_times(path, t, t)
}

/// The final path component without its last extension.
///
/// Works on Windows-style and POSIX-style paths alike, since the compiler
/// command line may carry either separator.
pub fn basename_without_extension(path: &str) -> &str {
    let base = match path.rfind(|c| c == '\\' || c == '/') {
        Some(i) => &path[i + 1..],
        None => path,
    };
    match base.rfind('.') {
        Some(i) if i > 0 => &base[..i],
        _ => base,
    }
}

/// Normalize a path the way the compiler does on its own command line:
/// separators become backslashes, doubled separators collapse, and `.`/`..`
/// components are resolved textually. The path is not resolved against the
/// filesystem.
pub fn normpath(path: &str) -> String {
    let path = path.replace('/', "\\");
    let (prefix, rest) = if path.len() >= 2 && path.as_bytes()[1] == b':' {
        path.split_at(2)
    } else {
        ("", &path[..])
    };
    let rooted = rest.starts_with('\\');
    let mut components: Vec<&str> = vec![];
    for component in rest.split('\\') {
        match component {
            "" | "." => {}
            ".." => {
                if components.last().map(|c| *c != "..").unwrap_or(false) {
                    components.pop();
                } else if !rooted {
                    components.push(component);
                }
            }
            c => components.push(c),
        }
    }
    let mut out = String::from(prefix);
    if rooted {
        out.push('\\');
    }
    out.push_str(&components.join("\\"));
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Case normalization as applied to paths reported by the compiler. On
/// Windows paths are case-insensitive, so they are lowercased (and forward
/// slashes flipped) before being compared or stored in a manifest. Elsewhere
/// the path is significant as-is.
#[cfg(windows)]
pub fn normcase(path: &str) -> String {
    path.replace('/', "\\").to_lowercase()
}

#[cfg(not(windows))]
pub fn normcase(path: &str) -> String {
    path.to_owned()
}

/// Convert a command-line path to the host's separator so it can be handed
/// to the filesystem. A no-op on Windows.
pub fn native_path(path: &str) -> String {
    if MAIN_SEPARATOR == '\\' {
        path.to_owned()
    } else {
        path.replace('\\', "/")
    }
}

/// A location-independent identity for a possibly relative command-line
/// path: resolved against the current directory, but not against the
/// filesystem. Drive-letter paths are already absolute in the compiler's
/// eyes and are left alone.
pub fn absolute_path(path: &str) -> String {
    let native = native_path(path);
    if Path::new(&native).is_absolute()
        || (native.len() >= 2 && native.as_bytes()[1] == b':') {
        return native;
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(&native).to_string_lossy().into_owned(),
        Err(_) => native,
    }
}

/// Normalize the `CLCACHE_BASEDIR` value: lowercased, with a guaranteed
/// trailing separator so prefix matches cannot cut a path component in half.
/// Empty values count as unset.
pub fn normalize_base_dir(base_dir: Option<String>) -> Option<String> {
    match base_dir {
        None => None,
        Some(ref s) if s.is_empty() => None,
        Some(s) => {
            let mut dir = s.to_lowercase();
            if !dir.ends_with('\\') && !dir.ends_with('/') {
                dir.push('\\');
            }
            Some(dir)
        }
    }
}

#[cfg(windows)]
pub fn from_local_codepage(bytes: &[u8]) -> io::Result<String> {
    use local_encoding::{Encoder, Encoding};
    Encoding::OEM.to_string(bytes)
}

#[cfg(not(windows))]
pub fn from_local_codepage(bytes: &[u8]) -> io::Result<String> {
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_digest_is_32_lowercase_hex() {
        let mut d = Digest::new();
        d.update(b"hello world");
        let digest = d.finish();
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_digit(16) && !c.is_uppercase()));
    }

    #[test]
    fn test_digest_differs_by_content() {
        let mut a = Digest::new();
        a.update(b"hello");
        let mut b = Digest::new();
        b.update(b"goodbye");
        assert!(a.finish() != b.finish());
    }

    #[test]
    fn test_framed_update_prevents_repartitioning() {
        let mut joined = Digest::new();
        joined.update_framed(b"d88be7edbf");
        let mut split = Digest::new();
        split.update_framed(b"d88be");
        split.update_framed(b"7edbf");
        assert!(joined.finish() != split.finish());
    }

    #[test]
    fn test_basename_without_extension() {
        assert_eq!(basename_without_extension("README.asciidoc"), "README");
        assert_eq!(basename_without_extension("/home/user/README.asciidoc"), "README");
        assert_eq!(basename_without_extension(r"C:\Project\README.asciidoc"), "README");

        assert_eq!(basename_without_extension("READ ME.asciidoc"), "READ ME");
        assert_eq!(basename_without_extension(r"C:\Project\READ ME.asciidoc"), "READ ME");

        assert_eq!(basename_without_extension("README.asciidoc.tmp"), "README.asciidoc");
        assert_eq!(basename_without_extension(r"C:\Project\README.asciidoc.tmp"),
                   "README.asciidoc");

        assert_eq!(basename_without_extension("noextension"), "noextension");
    }

    #[test]
    fn test_normpath() {
        assert_eq!(normpath("."), ".");
        assert_eq!(normpath(r"fo-build-debug\"), "fo-build-debug");
        assert_eq!(normpath(r"Debug\TheOutFile.obj"), r"Debug\TheOutFile.obj");
        assert_eq!(normpath("Debug/TheOutFile.obj"), r"Debug\TheOutFile.obj");
        assert_eq!(normpath(r"De\bug/TheOutFile.obj"), r"De\bug\TheOutFile.obj");
        assert_eq!(normpath("Debug//TheOutFile.obj"), r"Debug\TheOutFile.obj");
        assert_eq!(normpath(r"Debug\\TheOutFile.obj"), r"Debug\TheOutFile.obj");
        assert_eq!(normpath(r"a\b\..\c"), r"a\c");
        assert_eq!(normpath(r"a\.\b"), r"a\b");
        assert_eq!(normpath(r"c:\out dir\main.obj"), r"c:\out dir\main.obj");
        assert_eq!(normpath(r"\foo\bar"), r"\foo\bar");
    }

    #[test]
    fn test_normalize_base_dir() {
        assert_eq!(normalize_base_dir(None), None);
        assert_eq!(normalize_base_dir(Some("".to_owned())), None);

        assert_eq!(normalize_base_dir(Some("c:".to_owned())),
                   Some("c:\\".to_owned()));
        assert_eq!(normalize_base_dir(Some(r"c:\projects".to_owned())),
                   Some("c:\\projects\\".to_owned()));

        assert_eq!(normalize_base_dir(Some(r"C:\".to_owned())),
                   Some("c:\\".to_owned()));
        assert_eq!(normalize_base_dir(Some(r"C:\Projects\".to_owned())),
                   Some("c:\\projects\\".to_owned()));

        assert_eq!(normalize_base_dir(Some(r"c:\projects with space".to_owned())),
                   Some("c:\\projects with space\\".to_owned()));
    }

    #[test]
    fn test_files_beneath() {
        use tempdir::TempDir;
        use std::fs;
        use std::io::Write;

        let t = TempDir::new("util-test").unwrap();
        fs::create_dir_all(t.path().join("a")).unwrap();
        fs::create_dir_all(t.path().join("b").join("c")).unwrap();
        for name in &["a/1.txt", "a/2.txt", "b/c/3.txt"] {
            let mut f = File::create(t.path().join(name)).unwrap();
            f.write_all(b"x").unwrap();
        }
        let files = files_beneath(t.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(directory_size(t.path()).unwrap(), 3);

        assert!(files_beneath(&t.path().join("missing")).unwrap().is_empty());
    }
}
