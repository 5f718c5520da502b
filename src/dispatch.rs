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

//! Top-level orchestration of one wrapper invocation: analysis, the
//! direct-mode and preprocessor-mode cache paths, `/MP` fan-out, and the
//! pass-through for everything the cache cannot serve.

use futures::future::{self, Future};
use futures_cpupool::CpuPool;
use std::collections::HashSet;
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use cache::manifest::{Manifest, ManifestRepository};
use cache::stats::Statistics;
use cache::Cache;
use compiler::cmdline::expand_response_files;
use compiler::includes::parse_includes;
use compiler::{job_count, AnalysisError, RequestAnalyzer};
use errors::*;
use mock_command::{CommandCreator, RunCommand};
use util::{absolute_path, from_local_codepage, native_path, normalize_base_dir, normcase,
           Digest};

/// Exit code reported when the wrapper itself fails, as opposed to the
/// compiler failing.
pub const WRAPPER_FAILURE_EXIT_CODE: i32 = 254;

/// Paths below `CLCACHE_BASEDIR` are stored and hashed with this prefix in
/// place of the base directory, so builds in differently-located checkouts
/// can share cache entries.
const BASE_DIR_PLACEHOLDER: &'static str = "<BASEDIR>\\";

/// Behavior switches derived from the environment once per process.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Look up objects via manifests before falling back to the
    /// preprocessor. Disabled by `CLCACHE_NODIRECT`.
    pub direct_mode: bool,
    /// Hard-link objects out of the cache instead of copying them.
    pub hardlink: bool,
    /// Normalized `CLCACHE_BASEDIR`, if configured.
    pub base_dir: Option<String>,
}

impl DispatchSettings {
    pub fn from_env() -> DispatchSettings {
        DispatchSettings {
            direct_mode: env::var_os("CLCACHE_NODIRECT").is_none(),
            hardlink: env::var_os("CLCACHE_HARDLINK").is_some(),
            base_dir: normalize_base_dir(env::var("CLCACHE_BASEDIR").ok()),
        }
    }
}

/// Why a compilation was not served from the cache.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MissReason {
    /// No direct-mode bookkeeping for this call.
    Plain,
    /// No manifest for this (compiler, command line, source) combination.
    SourceChanged,
    /// A manifest exists but none of its entries match the current header
    /// contents.
    HeaderChanged,
    /// A manifest entry matched but its object has been evicted.
    Evicted,
}

#[derive(Clone)]
pub struct Dispatcher<C: CommandCreator> {
    creator: C,
    compiler: PathBuf,
    compiler_digest: String,
    cache: Cache,
    settings: DispatchSettings,
}

impl<C: CommandCreator> Dispatcher<C> {
    pub fn new(creator: C,
               compiler: PathBuf,
               cache: Cache,
               settings: DispatchSettings)
               -> Result<Dispatcher<C>> {
        let compiler_digest = Digest::file(&compiler)
            .chain_err(|| format!("failed to hash compiler binary {:?}", compiler))?;
        Ok(Dispatcher {
            creator: creator,
            compiler: compiler,
            compiler_digest: compiler_digest,
            cache: cache,
            settings: settings,
        })
    }

    /// Handle one invocation of the wrapper: decide cacheability, serve or
    /// populate the cache, or fall back to running the compiler untouched.
    /// Returns the process exit code.
    pub fn process_compile_request(&self,
                                   args: &[String],
                                   environment: &[(String, String)])
                                   -> Result<i32> {
        trace!("analyzing command line {:?}", args);
        let analysis = RequestAnalyzer::analyze_environment(environment).and_then(|_| {
            let expanded = expand_response_files(args).map_err(|e| {
                debug!("response file expansion failed: {}", e);
                AnalysisError::InvalidArgument
            })?;
            RequestAnalyzer::analyze_command_line(&expanded)
                .map(|(sources, objects)| (expanded, sources, objects))
        });

        match analysis {
            Ok((expanded, sources, objects)) => {
                self.schedule_jobs(&expanded, sources, objects)
            }
            Err(error) => {
                debug!("cannot cache invocation {:?}: {:?}", args, error);
                self.with_statistics(|stats| match error {
                    AnalysisError::NoSourceFile => {
                        stats.register_call_without_source_file()
                    }
                    AnalysisError::MultipleSourceFilesComplex => {
                        stats.register_call_with_multiple_source_files()
                    }
                    AnalysisError::CalledForLink => stats.register_call_for_linking(),
                    AnalysisError::CalledForPreprocessing => {
                        stats.register_call_for_preprocessing()
                    }
                    AnalysisError::CalledForPch => stats.register_call_with_pch(),
                    AnalysisError::CalledForExternalDebugInfo => {
                        stats.register_call_for_external_debug_info()
                    }
                    AnalysisError::InvalidArgument => {
                        stats.register_call_with_invalid_argument()
                    }
                    AnalysisError::UnsupportedEnvironment => {
                        stats.register_call_with_unsupported_environment()
                    }
                })?;
                self.invoke_real_compiler(args)
            }
        }
    }

    /// Dispatch the analyzed request: directly for a single source file,
    /// through a worker pool when `/MP` fans out over several.
    fn schedule_jobs(&self,
                     cmdline: &[String],
                     sources: Vec<String>,
                     objects: Vec<String>)
                     -> Result<i32> {
        if sources.len() == 1 {
            let (code, stdout, stderr) =
                self.process_single_source(cmdline, &sources[0], &objects[0])?;
            print_output_chunk(&stdout, &stderr)?;
            return Ok(code);
        }

        let workers = job_count(cmdline);
        debug!("dispatching {} source files on {} workers", sources.len(), workers);
        let pool = CpuPool::new(workers);
        let source_set: HashSet<String> = sources.iter().cloned().collect();
        let jobs: Vec<_> = sources.into_iter()
            .zip(objects)
            .map(|(source, object)| {
                let mut job_cmdline: Vec<String> = cmdline.iter()
                    .filter(|arg| !source_set.contains(*arg))
                    .cloned()
                    .collect();
                job_cmdline.push(source.clone());
                let me = self.clone();
                pool.spawn_fn(move || -> Result<i32> {
                    let (code, stdout, stderr) =
                        me.process_single_source(&job_cmdline, &source, &object)?;
                    print_output_chunk(&stdout, &stderr)?;
                    Ok(code)
                })
            })
            .collect();
        let codes = future::join_all(jobs).wait()?;
        Ok(codes.into_iter().max().unwrap_or(0))
    }

    fn process_single_source(&self,
                             cmdline: &[String],
                             source: &str,
                             object: &str)
                             -> Result<(i32, Vec<u8>, Vec<u8>)> {
        if self.settings.direct_mode {
            self.process_direct(cmdline, source, object)
        } else {
            self.compile_with_cache(cmdline, source, object, None)
        }
    }

    /// Direct mode: identify the object from the manifest's header list
    /// without running the preprocessor.
    fn process_direct(&self,
                      cmdline: &[String],
                      source: &str,
                      object: &str)
                      -> Result<(i32, Vec<u8>, Vec<u8>)> {
        let manifest_hash = self.manifest_hash(cmdline, source)?;
        let section = self.cache.manifests().section(&manifest_hash);
        let mut reason = MissReason::SourceChanged;
        if let Some(manifest) = section.get_manifest(&manifest_hash)? {
            reason = MissReason::HeaderChanged;
            let include_files: Vec<String> = manifest.include_files
                .iter()
                .map(|path| self.expand_base_dir(path))
                .collect();
            match ManifestRepository::includes_content_hash_for_files(&include_files) {
                Ok(includes_hash) => {
                    if let Some(object_hash) = manifest.entries.get(&includes_hash) {
                        let artifacts = self.cache.artifacts().section(object_hash);
                        match artifacts.get_entry(object_hash)? {
                            Some(entry) => {
                                trace!("[{}]: direct hit for object {}", source, object_hash);
                                artifacts.copy_object(object_hash,
                                                      Path::new(&native_path(object)),
                                                      self.settings.hardlink)?;
                                self.with_statistics(|stats| stats.register_cache_hit())?;
                                return Ok((0, entry.stdout, entry.stderr));
                            }
                            None => reason = MissReason::Evicted,
                        }
                    }
                }
                Err(Error(ErrorKind::IncludeNotFound(path), _)) => {
                    debug!("[{}]: include file {} vanished, identifying object via \
                            the preprocessor",
                           source,
                           path);
                }
                Err(e) => return Err(e),
            }
        }
        self.compile_with_cache(cmdline, source, object, Some((manifest_hash, reason)))
    }

    /// Preprocessor mode: identify the object by hashing the preprocessed
    /// source, then replay it or compile for real and fill the cache.
    fn compile_with_cache(&self,
                          cmdline: &[String],
                          source: &str,
                          object: &str,
                          manifest: Option<(String, MissReason)>)
                          -> Result<(i32, Vec<u8>, Vec<u8>)> {
        let reason = manifest.as_ref().map(|&(_, r)| r).unwrap_or(MissReason::Plain);

        let pp = self.run_preprocessor(cmdline)?;
        if !pp.status.success() {
            // Without preprocessor output there is no cache key; run the
            // compiler uncached and let it report the actual problem.
            debug!("[{}]: preprocessor failed with {:?}, compiling uncached",
                   source,
                   pp.status.code());
            let output = self.run_compiler(cmdline, &[])?;
            self.register_miss(reason)?;
            return Ok((forwarded_exit_code(&output.status), output.stdout, output.stderr));
        }
        let object_hash = self.object_hash(cmdline, source, &pp.stdout);
        let artifacts = self.cache.artifacts().section(&object_hash);

        if let Some(entry) = artifacts.get_entry(&object_hash)? {
            trace!("[{}]: preprocessor hit for object {}", source, object_hash);
            artifacts.copy_object(&object_hash,
                                  Path::new(&native_path(object)),
                                  self.settings.hardlink)?;
            if let Some((ref manifest_hash, _)) = manifest {
                // The preprocessor run reports includes on stderr.
                let pp_stderr = from_local_codepage(&pp.stderr)?;
                let (includes, _) = parse_includes(&pp_stderr, source, false);
                self.update_manifest(manifest_hash, &includes, &object_hash)?;
            }
            self.with_statistics(|stats| stats.register_cache_hit())?;
            return Ok((0, entry.stdout, entry.stderr));
        }

        // True miss: compile for real. When a manifest is kept for this
        // call, ask for the include list so it can learn the header set;
        // include echo lines the user did not ask for are stripped again.
        let user_show_includes = cmdline.iter()
            .any(|arg| arg == "/showIncludes" || arg == "-showIncludes");
        let record_includes = manifest.is_some() && !user_show_includes;
        let extra_args: &[&str] = if record_includes { &["/showIncludes"] } else { &[] };
        let output = self.run_compiler(cmdline, extra_args)?;
        let stdout_text = from_local_codepage(&output.stdout)?;
        let (includes, stdout_text) = parse_includes(&stdout_text, source, record_includes);
        let stdout_bytes = stdout_text.into_bytes();

        if !output.status.success() {
            debug!("[{}]: compiler failed with {:?}, not caching",
                   source,
                   output.status.code());
            self.register_miss(reason)?;
            return Ok((forwarded_exit_code(&output.status), stdout_bytes, output.stderr));
        }

        artifacts.set_entry(&object_hash,
                            Path::new(&native_path(object)),
                            &stdout_bytes,
                            &output.stderr)?;
        if let Some((ref manifest_hash, _)) = manifest {
            self.update_manifest(manifest_hash, &includes, &object_hash)?;
        }
        self.register_miss(reason)?;
        self.clean_cache_if_needed()?;
        Ok((0, stdout_bytes, output.stderr))
    }

    /// Record a new (header contents -> object) pair, merging the include
    /// list. Serialized against other processes via the cache lock.
    fn update_manifest(&self,
                       manifest_hash: &str,
                       includes: &[String],
                       object_hash: &str)
                       -> Result<()> {
        let includes_hash = match ManifestRepository::includes_content_hash_for_files(includes) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("skipping manifest update, includes cannot be hashed: {}", e);
                return Ok(());
            }
        };
        let collapsed: Vec<String> = includes.iter()
            .map(|path| self.collapse_base_dir(path))
            .collect();
        let section = self.cache.manifests().section(manifest_hash);
        let _lock = self.cache.lock()?;
        let mut manifest = section.get_manifest(manifest_hash)?.unwrap_or_else(Manifest::new);
        manifest.merge_include_files(&collapsed);
        manifest.add_entry(includes_hash, object_hash.to_owned());
        section.set_manifest(manifest_hash, &manifest)
    }

    /// The manifest key: compiler binary, normalized arguments, and the
    /// source file's identity and contents.
    fn manifest_hash(&self, cmdline: &[String], source: &str) -> Result<String> {
        let mut digest = Digest::new();
        digest.update_framed(self.compiler_digest.as_bytes());
        for arg in self.normalized_arguments(cmdline, source) {
            digest.update_framed(arg.as_bytes());
        }
        digest.update_framed(self.collapse_base_dir(&normcase(&absolute_path(source)))
            .as_bytes());
        digest.update_framed(Digest::file(&native_path(source))?.as_bytes());
        Ok(digest.finish())
    }

    /// The object key: compiler binary, normalized arguments, and the
    /// preprocessed source text.
    fn object_hash(&self, cmdline: &[String], source: &str, preprocessed: &[u8]) -> String {
        let mut digest = Digest::new();
        digest.update_framed(self.compiler_digest.as_bytes());
        for arg in self.normalized_arguments(cmdline, source) {
            digest.update_framed(arg.as_bytes());
        }
        digest.update_framed(preprocessed);
        digest.finish()
    }

    /// The arguments that determine the compilation result: everything but
    /// the source file itself and the object destination. (`/Zi` is
    /// rejected during analysis, so the object contents cannot depend on
    /// the output path.)
    fn normalized_arguments(&self, cmdline: &[String], source: &str) -> Vec<String> {
        cmdline.iter()
            .filter(|arg| *arg != source)
            .filter(|arg| !arg.starts_with("/Fo") && !arg.starts_with("-Fo"))
            .map(|arg| self.collapse_base_dir(arg))
            .collect()
    }

    fn collapse_base_dir(&self, text: &str) -> String {
        let base = match self.settings.base_dir {
            Some(ref base) => base,
            None => return text.to_owned(),
        };
        // Path case is insignificant on Windows only.
        let pos = if cfg!(windows) {
            text.to_lowercase().find(base.as_str())
        } else {
            text.find(base.as_str())
        };
        if let Some(pos) = pos {
            if let (Some(before), Some(after)) =
                (text.get(..pos), text.get(pos + base.len()..)) {
                return format!("{}{}{}", before, BASE_DIR_PLACEHOLDER, after);
            }
        }
        text.to_owned()
    }

    fn expand_base_dir(&self, path: &str) -> String {
        if path.starts_with(BASE_DIR_PLACEHOLDER) {
            if let Some(ref base) = self.settings.base_dir {
                return format!("{}{}", base, &path[BASE_DIR_PLACEHOLDER.len()..]);
            }
        }
        path.to_owned()
    }

    /// Preprocess to stdout; `/showIncludes` notes arrive on stderr in
    /// this mode. `/c` and the object destination do not apply.
    fn run_preprocessor(&self, cmdline: &[String]) -> Result<process::Output> {
        let mut cmd = self.creator.new_command(&self.compiler);
        let args: Vec<&String> = cmdline.iter()
            .filter(|arg| {
                *arg != "/c" && *arg != "-c" && !arg.starts_with("/Fo")
                    && !arg.starts_with("-Fo")
            })
            .collect();
        for arg in args {
            cmd.arg(arg);
        }
        cmd.arg("/EP").arg("/showIncludes").arg("/nologo");
        trace!("preprocess: {:?}", cmd);
        cmd.output().map_err(Into::into)
    }

    fn run_compiler(&self, cmdline: &[String], extra_args: &[&str]) -> Result<process::Output> {
        let mut cmd = self.creator.new_command(&self.compiler);
        cmd.args(cmdline);
        for arg in extra_args {
            cmd.arg(arg);
        }
        debug!("compile: {:?}", cmd);
        cmd.output().map_err(Into::into)
    }

    /// Run the compiler with the original arguments and the original
    /// stdio. The wrapper is invisible on this path.
    fn invoke_real_compiler(&self, args: &[String]) -> Result<i32> {
        let mut cmd = self.creator.new_command(&self.compiler);
        cmd.args(args);
        debug!("pass-through: {:?}", cmd);
        let status = cmd.status()?;
        Ok(forwarded_exit_code(&status))
    }

    fn with_statistics<F: FnOnce(&mut Statistics)>(&self, f: F) -> Result<()> {
        let _lock = self.cache.lock()?;
        let mut stats = self.cache.statistics()?;
        f(&mut stats);
        stats.save()
    }

    fn register_miss(&self, reason: MissReason) -> Result<()> {
        self.with_statistics(|stats| match reason {
            MissReason::Plain => stats.register_cache_miss(),
            MissReason::SourceChanged => stats.register_source_changed_miss(),
            MissReason::HeaderChanged => stats.register_header_changed_miss(),
            MissReason::Evicted => stats.register_evicted_miss(),
        })
    }

    /// Trim the artifact repository to 90% of the configured maximum once
    /// it overflows. Runs after a store, never while the compiler does.
    fn clean_cache_if_needed(&self) -> Result<()> {
        let maximum = self.cache.configuration()?.maximum_cache_size();
        if self.cache.artifacts().size()? > maximum {
            let _lock = self.cache.lock()?;
            let size = self.cache.artifacts().clean(maximum / 10 * 9)?;
            debug!("cleaned artifact repository down to {} bytes", size);
        }
        Ok(())
    }
}

/// The compiler's own exit code, forwarded. A compiler killed by a signal
/// has no code; report the wrapper failure code instead.
fn forwarded_exit_code(status: &process::ExitStatus) -> i32 {
    status.code().unwrap_or(WRAPPER_FAILURE_EXIT_CODE)
}

/// Write one job's captured output in a single chunk, so parallel jobs
/// never interleave within a line.
fn print_output_chunk(stdout_bytes: &[u8], stderr_bytes: &[u8]) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle.write_all(stdout_bytes)?;
    handle.flush()?;
    io::stderr().write_all(stderr_bytes)?;
    Ok(())
}
