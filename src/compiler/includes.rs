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

use std::collections::HashSet;

use util::normcase;

/// Prefixes the compiler emits in front of each `/showIncludes` line, one
/// per supported output language. Other locales can be supported by adding
/// their prefix here.
const SHOW_INCLUDES_PREFIXES: &'static [&'static str] = &[
    // English
    "Note: including file:",
    // German
    "Hinweis: Einlesen der Datei:",
];

/// Extract the header paths reported via `/showIncludes` from compiler
/// output.
///
/// Returns the referenced files (first-seen order, duplicates and the
/// compiled source file itself removed) and the compiler output. With
/// `strip` the include lines are removed from the returned output and the
/// remaining lines are kept in their original order; without it the output
/// is returned untouched.
pub fn parse_includes(compiler_output: &str,
                      source_file: &str,
                      strip: bool)
                      -> (Vec<String>, String) {
    let mut includes = vec![];
    let mut seen = HashSet::new();
    let mut new_output = String::new();
    let source_file = normcase(source_file);
    for line in lines_with_endings(compiler_output) {
        match include_path(line.trim_right_matches(|c| c == '\r' || c == '\n')) {
            Some(path) => {
                let path = normcase(path);
                if path != source_file && seen.insert(path.clone()) {
                    includes.push(path);
                }
            }
            None => {
                if strip {
                    new_output.push_str(line);
                }
            }
        }
    }
    if strip {
        (includes, new_output)
    } else {
        (includes, compiler_output.to_owned())
    }
}

/// The path named by an include line, or `None` if the line is ordinary
/// compiler output. A line only counts as an include line if a known prefix
/// matches (ASCII case-insensitively) and the remainder is an absolute path.
fn include_path(line: &str) -> Option<&str> {
    for prefix in SHOW_INCLUDES_PREFIXES {
        let candidate = match line.get(..prefix.len()) {
            Some(c) => c,
            None => continue,
        };
        if candidate.eq_ignore_ascii_case(prefix) {
            let path = line[prefix.len()..].trim();
            if is_absolute(path) {
                return Some(path);
            }
        }
    }
    None
}

/// Absolute in the compiler's eyes: a drive letter, a UNC path, or rooted at
/// a separator.
fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    (bytes.len() > 2 && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/'))
        || path.starts_with("\\\\")
        || path.starts_with('/')
}

fn lines_with_endings(s: &str) -> Vec<&str> {
    let mut lines = vec![];
    let mut start = 0;
    for (i, b) in s.bytes().enumerate() {
        if b == b'\n' {
            lines.push(&s[start..i + 1]);
            start = i + 1;
        }
    }
    if start < s.len() {
        lines.push(&s[start..]);
    }
    lines
}
