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

//! Administrative commands, recognized when the first argument starts with
//! `--`. Everything else on the command line belongs to the compiler.

use clap::{App, AppSettings, Arg, ErrorKind};
use number_prefix::{binary_prefix, Prefixed, Standalone};
use std::io::{self, Write};
use std::iter;

use cache::Cache;
use errors::*;

pub fn run_command(args: &[String], cache: Cache) -> Result<i32> {
    let parse = App::new("clcache")
        .about("A compiler cache for the Microsoft C/C++ compiler.")
        .setting(AppSettings::ArgRequiredElseHelp)
        .arg(Arg::with_name("stats")
            .long("stats")
            .help("Print cache statistics"))
        .arg(Arg::with_name("clean")
            .long("clean")
            .help("Trim the cache to 90% of its configured maximum size"))
        .arg(Arg::with_name("zero-stats")
            .long("zero-stats")
            .help("Reset all statistics counters"))
        .arg(Arg::with_name("set-config")
            .long("set-config")
            .takes_value(true)
            .value_name("KEY=VALUE")
            .help("Change a persisted setting, e.g. max-size=10737418240"))
        .get_matches_from_safe(iter::once("clcache".to_owned()).chain(args.iter().cloned()));
    let matches = match parse {
        Ok(matches) => matches,
        Err(ref e) if e.kind == ErrorKind::HelpDisplayed ||
                      e.kind == ErrorKind::VersionDisplayed => {
            println!("{}", e.message);
            return Ok(0);
        }
        Err(e) => {
            writeln!(io::stderr(), "{}", e.message)?;
            return Ok(1);
        }
    };

    if matches.is_present("stats") {
        print_statistics(&cache)?;
    }
    if matches.is_present("zero-stats") {
        zero_statistics(&cache)?;
    }
    if let Some(assignment) = matches.value_of("set-config") {
        set_config(&cache, assignment)?;
    }
    if matches.is_present("clean") {
        clean(&cache)?;
    }
    Ok(0)
}

fn format_size(size: u64) -> String {
    match binary_prefix(size as f64) {
        Standalone(bytes) => format!("{} bytes", bytes),
        Prefixed(prefix, n) => format!("{:.2} {}B", n, prefix),
    }
}

fn print_statistics(cache: &Cache) -> Result<()> {
    let _lock = cache.lock()?;
    let config = cache.configuration()?;
    let stats = cache.statistics()?;
    let size = cache.manifests().size()? + cache.artifacts().size()?;

    println!("clcache statistics:");
    println!("  cache directory                : {}", cache.root().display());
    println!("  current cache size             : {}", format_size(size));
    println!("  maximum cache size             : {}",
             format_size(config.maximum_cache_size()));
    println!("  cache hits                     : {}", stats.num_cache_hits());
    println!("  cache misses");
    println!("    total                        : {}", stats.num_cache_misses());
    println!("    evicted                      : {}", stats.num_evicted_misses());
    println!("    header changed               : {}", stats.num_header_changed_misses());
    println!("    source changed               : {}", stats.num_source_changed_misses());
    println!("  calls without source file      : {}",
             stats.num_calls_without_source_file());
    println!("  calls with multiple sources    : {}",
             stats.num_calls_with_multiple_source_files());
    println!("  calls for linking              : {}", stats.num_calls_for_linking());
    println!("  calls for preprocessing        : {}",
             stats.num_calls_for_preprocessing());
    println!("  calls with PCH                 : {}", stats.num_calls_with_pch());
    println!("  calls for external debug info  : {}",
             stats.num_calls_for_external_debug_info());
    println!("  calls with invalid argument    : {}",
             stats.num_calls_with_invalid_argument());
    println!("  calls with unsupported env     : {}",
             stats.num_calls_with_unsupported_environment());
    Ok(())
}

fn zero_statistics(cache: &Cache) -> Result<()> {
    let _lock = cache.lock()?;
    let mut stats = cache.statistics()?;
    stats.zero();
    stats.save()?;
    println!("statistics reset");
    Ok(())
}

/// Trim both repositories to 90% of the configured maximum. Manifests get
/// at most a tenth of the budget; they are small, so this only matters for
/// degenerate caches.
fn clean(cache: &Cache) -> Result<()> {
    let _lock = cache.lock()?;
    let target = cache.configuration()?.maximum_cache_size() / 10 * 9;
    let mut manifests_size = cache.manifests().size()?;
    if manifests_size > target / 10 {
        manifests_size = cache.manifests().clean(target / 10)?;
    }
    let artifacts_size = cache.artifacts().clean(target.saturating_sub(manifests_size))?;
    println!("cache cleaned, new size {}",
             format_size(manifests_size + artifacts_size));
    Ok(())
}

fn set_config(cache: &Cache, assignment: &str) -> Result<()> {
    let mut parts = assignment.splitn(2, '=');
    let key = parts.next().unwrap_or("");
    let value = match parts.next() {
        Some(value) => value,
        None => bail!("expected KEY=VALUE, got {:?}", assignment),
    };
    match key {
        "max-size" => {
            let size: u64 = value.parse()
                .map_err(|_| format!("invalid cache size {:?}", value))?;
            let _lock = cache.lock()?;
            let mut config = cache.configuration()?;
            config.set_maximum_cache_size(size);
            config.save()?;
            println!("maximum cache size set to {}",
                     format_size(config.maximum_cache_size()));
        }
        _ => bail!("unknown configuration key {:?}", key),
    }
    Ok(())
}
