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

use std::fs::File;
use std::io::Read;
use std::mem;
use std::path::Path;

use errors::*;

/// Split a command string into arguments following the rules the Microsoft
/// C runtime applies to a process command line:
///
/// - Whitespace separates arguments unless inside a quoted span.
/// - A double quote toggles the quoted state and is consumed.
/// - A run of `n` backslashes followed by a quote yields `n/2` backslashes;
///   if `n` is odd the quote is emitted literally instead of toggling.
/// - Backslashes not followed by a quote are emitted verbatim.
/// - Adjacent quoted and unquoted spans concatenate into one argument.
///
/// An unterminated quoted span runs to the end of the input and produces a
/// single argument containing everything after the opening quote.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = vec![];
    let mut arg = String::new();
    let mut have_arg = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' if !in_quotes => {
                if have_arg {
                    args.push(mem::replace(&mut arg, String::new()));
                    have_arg = false;
                }
            }
            '"' => {
                in_quotes = !in_quotes;
                have_arg = true;
            }
            '\\' => {
                let mut count = 1;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    count += 1;
                }
                if chars.peek() == Some(&'"') {
                    for _ in 0..count / 2 {
                        arg.push('\\');
                    }
                    if count % 2 == 1 {
                        // Escaped quote; the quote is literal and does not
                        // toggle the quoted state.
                        chars.next();
                        arg.push('"');
                    }
                } else {
                    for _ in 0..count {
                        arg.push('\\');
                    }
                }
                have_arg = true;
            }
            c => {
                arg.push(c);
                have_arg = true;
            }
        }
    }
    if have_arg {
        args.push(arg);
    }
    args
}

/// Replace every `@file` argument with the lexed contents of that response
/// file, recursively. Arguments that are not response file references are
/// passed through untouched.
pub fn expand_response_files(args: &[String]) -> Result<Vec<String>> {
    let mut expanded = vec![];
    for arg in args {
        if arg.starts_with('@') {
            let contents = read_response_file(Path::new(&arg[1..]))?;
            expanded.extend(expand_response_files(&split_command_line(contents.trim()))?);
        } else {
            expanded.push(arg.clone());
        }
    }
    Ok(expanded)
}

/// Response files written by MSBuild are UTF-16 with a BOM; hand-written
/// ones are usually plain UTF-8.
fn read_response_file(path: &Path) -> Result<String> {
    let mut raw = vec![];
    File::open(path)
        .chain_err(|| format!("failed to open response file {:?}", path))?
        .read_to_end(&mut raw)?;
    decode_response_file(&raw)
        .chain_err(|| format!("failed to decode response file {:?}", path))
}

fn decode_response_file(raw: &[u8]) -> Result<String> {
    if raw.starts_with(&[0xff, 0xfe]) {
        return decode_utf16(&raw[2..], true);
    }
    if raw.starts_with(&[0xfe, 0xff]) {
        return decode_utf16(&raw[2..], false);
    }
    let raw = if raw.starts_with(&[0xef, 0xbb, 0xbf]) { &raw[3..] } else { raw };
    String::from_utf8(raw.to_vec()).map_err(|_| "response file is not valid UTF-8".into())
}

fn decode_utf16(raw: &[u8], little_endian: bool) -> Result<String> {
    if raw.len() % 2 != 0 {
        bail!("response file has an odd number of UTF-16 bytes");
    }
    let units: Vec<u16> = raw.chunks(2)
        .map(|c| if little_endian {
            (c[0] as u16) | ((c[1] as u16) << 8)
        } else {
            (c[1] as u16) | ((c[0] as u16) << 8)
        })
        .collect();
    String::from_utf16(&units).map_err(|_| "response file is not valid UTF-16".into())
}
