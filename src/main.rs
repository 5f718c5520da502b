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

//! A transparent compilation cache for the Microsoft C/C++ compiler.
//!
//! Invoked in place of `cl.exe`; compilations whose result is a function
//! of known inputs are served from an on-disk cache instead of re-running
//! the compiler. Administrative commands are available when the first
//! argument starts with `--`.

#![recursion_limit = "128"]

extern crate byteorder;
extern crate clap;
extern crate crypto;
extern crate directories;
extern crate env_logger;
#[macro_use]
extern crate error_chain;
extern crate filetime;
extern crate futures;
extern crate futures_cpupool;
#[macro_use]
extern crate lazy_static;
#[cfg(windows)]
extern crate local_encoding;
#[macro_use]
extern crate log;
extern crate num_cpus;
extern crate number_prefix;
extern crate regex;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate tempdir;
extern crate tempfile;
extern crate which;

mod cache;
mod commands;
mod compiler;
mod dispatch;
mod errors;
mod mock_command;
mod util;

use env_logger::LogBuilder;
use log::LogLevelFilter;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use cache::{cache_root_from_env, Cache};
use dispatch::{DispatchSettings, Dispatcher, WRAPPER_FAILURE_EXIT_CODE};
use errors::*;
use mock_command::ProcessCommandCreator;

fn main() {
    init_logging();
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            let stderr = &mut std::io::stderr();
            writeln!(stderr, "clcache: error: {}", e).ok();
            for e in e.iter().skip(1) {
                writeln!(stderr, "clcache: caused by: {}", e).ok();
            }
            WRAPPER_FAILURE_EXIT_CODE
        }
    };
    process::exit(code);
}

fn run() -> Result<i32> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args[0].starts_with("--") {
        let cache = Cache::new(cache_root_from_env())?;
        return commands::run_command(&args, cache);
    }

    let compiler = find_compiler()?;
    trace!("using compiler binary {:?}", compiler);
    let cache = Cache::new(cache_root_from_env())?;
    let settings = DispatchSettings::from_env();
    let dispatcher = Dispatcher::new(ProcessCommandCreator, compiler, cache, settings)?;
    let environment: Vec<(String, String)> = env::vars().collect();
    dispatcher.process_compile_request(&args, &environment)
}

/// The real compiler: `CLCACHE_CL` if set (a bare name is resolved on
/// `PATH`), `cl.exe` from `PATH` otherwise.
fn find_compiler() -> Result<PathBuf> {
    if let Some(cl) = env::var_os("CLCACHE_CL") {
        let cl = PathBuf::from(cl);
        let resolved = if cl.components().count() > 1 {
            if cl.is_file() { Some(cl) } else { None }
        } else {
            which::which(&cl).ok()
        };
        return resolved.ok_or_else(|| "CLCACHE_CL does not name a compiler binary".into());
    }
    which::which("cl.exe")
        .or_else(|_| which::which("cl"))
        .map_err(|_| "could not find cl.exe on PATH".into())
}

/// Diagnostics go to stderr and only when asked for: either the usual
/// `RUST_LOG` filters, or everything at once via `CLCACHE_LOG`.
fn init_logging() {
    let mut builder = LogBuilder::new();
    if env::var("CLCACHE_LOG").map(|v| !v.is_empty()).unwrap_or(false) {
        builder.filter(None, LogLevelFilter::Trace);
    } else if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse(&filters);
    }
    builder.init().ok();
}
