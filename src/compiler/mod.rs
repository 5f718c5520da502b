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

pub mod cmdline;
pub mod includes;

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

use num_cpus;
use util::{basename_without_extension, native_path, normpath};

/// The reasons an invocation cannot be served from the cache. Each variant
/// maps to one statistics counter and sends the invocation to the real
/// compiler unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    /// No source file in the command line.
    NoSourceFile,
    /// Multiple source files combined with an option that prevents
    /// splitting the invocation into independent single-source jobs.
    MultipleSourceFilesComplex,
    /// The compiler was invoked to link (`/link`, or no `/c`).
    CalledForLink,
    /// Preprocessor-only invocation (`/E`, `/P`, `/EP`).
    CalledForPreprocessing,
    /// Precompiled header creation (`/Yc`).
    CalledForPch,
    /// Debug information written to a separate file (`/Zi`, `/ZI`).
    CalledForExternalDebugInfo,
    /// An argument the compiler itself would reject, e.g. a parameter-less
    /// `/Ob`.
    InvalidArgument,
    /// `CL` or `_CL_` injects flags the wrapper cannot observe.
    UnsupportedEnvironment,
}

pub type AnalysisResult<T> = ::std::result::Result<T, AnalysisError>;

/// How an option consumes its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// `/NAMEparam`; an empty parameter is an error.
    RequiredAttached,
    /// `/NAME[param]`.
    OptionalAttached,
    /// `/NAMEparam` or `/NAME param`.
    MaybeSeparated,
    /// `/NAME param`.
    Separated,
}

/// A compiler option known to take a parameter. Everything else that starts
/// with `/` or `-` is a plain flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompilerArgument {
    pub name: &'static str,
    pub kind: ArgKind,
}

const fn argument(name: &'static str, kind: ArgKind) -> CompilerArgument {
    CompilerArgument { name: name, kind: kind }
}

/// The documented parameter behavior and the actual one disagree for
/// several options; this table records observed compiler behavior, not the
/// documentation. There are documented `/NAME param` options, but none the
/// compiler actually accepts, so no `Separated` entries exist.
const ARGUMENTS_WITH_PARAMETER: &'static [CompilerArgument] = &[
    argument("Ob", ArgKind::RequiredAttached),
    argument("Yl", ArgKind::RequiredAttached),
    argument("Zm", ArgKind::RequiredAttached),

    argument("doc", ArgKind::OptionalAttached),
    argument("FA", ArgKind::OptionalAttached),
    argument("FR", ArgKind::OptionalAttached),
    argument("Fr", ArgKind::OptionalAttached),
    argument("Gs", ArgKind::OptionalAttached),
    argument("MP", ArgKind::OptionalAttached),
    argument("Wv", ArgKind::OptionalAttached),
    argument("Yc", ArgKind::OptionalAttached),
    argument("Yu", ArgKind::OptionalAttached),
    argument("Zp", ArgKind::OptionalAttached),
    argument("Fa", ArgKind::OptionalAttached),
    argument("Fd", ArgKind::OptionalAttached),
    argument("Fe", ArgKind::OptionalAttached),
    argument("Fi", ArgKind::OptionalAttached),
    argument("Fm", ArgKind::OptionalAttached),
    argument("Fo", ArgKind::OptionalAttached),
    argument("Fp", ArgKind::OptionalAttached),

    argument("FI", ArgKind::MaybeSeparated),
    argument("U", ArgKind::MaybeSeparated),
    argument("I", ArgKind::MaybeSeparated),
    argument("F", ArgKind::MaybeSeparated),
    argument("FU", ArgKind::MaybeSeparated),
    argument("w1", ArgKind::MaybeSeparated),
    argument("w2", ArgKind::MaybeSeparated),
    argument("w3", ArgKind::MaybeSeparated),
    argument("w4", ArgKind::MaybeSeparated),
    argument("wd", ArgKind::MaybeSeparated),
    argument("we", ArgKind::MaybeSeparated),
    argument("wo", ArgKind::MaybeSeparated),
    argument("AI", ArgKind::MaybeSeparated),
    argument("D", ArgKind::MaybeSeparated),
    argument("V", ArgKind::MaybeSeparated),
    argument("Tc", ArgKind::MaybeSeparated),
    argument("Tp", ArgKind::MaybeSeparated),
];

fn recognized_argument(body: &str) -> Option<&'static CompilerArgument> {
    ARGUMENTS_WITH_PARAMETER.iter()
        .filter(|a| body.starts_with(a.name))
        .max_by_key(|a| a.name.len())
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    pub fn from_file_name(file: &Path) -> Option<Self> {
        match file.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase()) {
            Some(ref e) if e == "c" => Some(Language::C),
            Some(ref e) if e == "cc" || e == "cpp" || e == "cxx" => Some(Language::Cxx),
            e => {
                trace!("not a source extension: {:?}", e);
                None
            }
        }
    }
}

/// The per-name option values, in command-line order.
pub type Arguments = HashMap<String, Vec<String>>;

/// Decides whether an invocation can be cached and extracts the pieces the
/// dispatcher needs: the source files and the object file each of them
/// produces.
pub struct RequestAnalyzer;

impl RequestAnalyzer {
    /// `CL` and `_CL_` prepend and append compiler options without showing
    /// up in the command line, so a cache keyed on the command line cannot
    /// tolerate them. An empty value is equivalent to the variable being
    /// unset.
    pub fn analyze_environment(environment: &[(String, String)]) -> AnalysisResult<()> {
        for &(ref var, ref value) in environment {
            if (var == "CL" || var == "_CL_") && !value.is_empty() {
                return Err(AnalysisError::UnsupportedEnvironment);
            }
        }
        Ok(())
    }

    /// Classify every token as either an option (with its parameter, per
    /// the table above) or an input file.
    pub fn parse_arguments_and_input_files(cmdline: &[String])
                                           -> AnalysisResult<(Arguments, Vec<String>)> {
        let mut arguments: Arguments = HashMap::new();
        let mut input_files = vec![];
        let mut i = 0;
        while i < cmdline.len() {
            let token = &cmdline[i];
            if token.len() > 1 && (token.starts_with('/') || token.starts_with('-')) {
                let body = &token[1..];
                match recognized_argument(body) {
                    Some(argument) => {
                        let attached = &body[argument.name.len()..];
                        let value = match argument.kind {
                            ArgKind::RequiredAttached => {
                                if attached.is_empty() {
                                    return Err(AnalysisError::InvalidArgument);
                                }
                                attached.to_owned()
                            }
                            ArgKind::OptionalAttached => attached.to_owned(),
                            ArgKind::MaybeSeparated if !attached.is_empty() => {
                                attached.to_owned()
                            }
                            ArgKind::MaybeSeparated | ArgKind::Separated => {
                                i += 1;
                                match cmdline.get(i) {
                                    Some(v) => v.clone(),
                                    None => return Err(AnalysisError::InvalidArgument),
                                }
                            }
                        };
                        arguments.entry(argument.name.to_owned())
                            .or_insert_with(Vec::new)
                            .push(value);
                    }
                    None => {
                        arguments.entry(body.to_owned())
                            .or_insert_with(Vec::new)
                            .push(String::new());
                    }
                }
            } else if token.starts_with('@') {
                // Response files are expanded before analysis; one
                // surviving here means expansion failed.
                return Err(AnalysisError::InvalidArgument);
            } else {
                input_files.push(token.clone());
            }
            i += 1;
        }
        Ok((arguments, input_files))
    }

    /// Analyze a fully expanded command line. On success returns the source
    /// files and the object file each one compiles to.
    pub fn analyze_command_line(cmdline: &[String])
                                -> AnalysisResult<(Vec<String>, Vec<String>)> {
        let (arguments, input_files) = Self::parse_arguments_and_input_files(cmdline)?;

        let mut source_files: Vec<String> = input_files.into_iter()
            .filter(|f| Language::from_file_name(Path::new(&native_path(f))).is_some())
            .collect();
        // /Tc and /Tp name their source file explicitly, with a forced
        // language; such an invocation cannot be split per source file.
        let mut complex = false;
        for option in &["Tc", "Tp"] {
            if let Some(values) = arguments.get(*option) {
                complex = true;
                source_files.extend(values.iter().cloned());
            }
        }

        if source_files.is_empty() {
            return Err(AnalysisError::NoSourceFile);
        }
        if source_files.len() > 1 && complex {
            return Err(AnalysisError::MultipleSourceFilesComplex);
        }
        if arguments.contains_key("link") || !arguments.contains_key("c") {
            return Err(AnalysisError::CalledForLink);
        }
        if ["E", "P", "EP"].iter().any(|opt| arguments.contains_key(*opt)) {
            return Err(AnalysisError::CalledForPreprocessing);
        }
        if arguments.contains_key("Yc") {
            return Err(AnalysisError::CalledForPch);
        }
        if arguments.contains_key("Zi") || arguments.contains_key("ZI") {
            return Err(AnalysisError::CalledForExternalDebugInfo);
        }

        let object_files = Self::object_files(&arguments, &source_files);
        trace!("source files: {:?}, object files: {:?}", source_files, object_files);
        Ok((source_files, object_files))
    }

    /// Decide where each object file goes. `/Fo` may name a file (single
    /// source only) or a directory; without it the object lands next to the
    /// current directory under the source file's base name.
    fn object_files(arguments: &Arguments, source_files: &[String]) -> Vec<String> {
        let mut dir_prefix = None;
        if let Some(values) = arguments.get("Fo") {
            let raw = &values[0];
            if !raw.is_empty() {
                let normalized = normpath(raw);
                if raw.ends_with('\\') || raw.ends_with('/')
                    || names_existing_directory(&normalized) {
                    dir_prefix = Some(normalized);
                } else if source_files.len() == 1 {
                    return vec![normalized];
                }
            }
        }
        source_files.iter()
            .map(|source| {
                let name = format!("{}.obj", basename_without_extension(source));
                match dir_prefix {
                    Some(ref dir) => format!("{}\\{}", dir, name),
                    None => name,
                }
            })
            .collect()
    }
}

fn names_existing_directory(path: &str) -> bool {
    Path::new(&native_path(path)).is_dir()
}

lazy_static! {
    static ref MP_SWITCH: Regex = Regex::new(r"^[/-]MP(\d+)?$").unwrap();
}

/// The number of parallel jobs requested via `/MP`. The last occurrence
/// wins; a bare `/MP` means one job per logical CPU; a zero or unparsable
/// count falls back to a single job.
pub fn job_count(cmdline: &[String]) -> usize {
    let mut count = 1;
    for arg in cmdline {
        if let Some(caps) = MP_SWITCH.captures(arg) {
            count = match caps.get(1) {
                Some(m) => ::std::cmp::max(m.as_str().parse::<usize>().unwrap_or(1), 1),
                None => num_cpus::get(),
            };
        }
    }
    count
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    fn ovec(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn parsed(cmdline: &[&str]) -> (Arguments, Vec<String>) {
        RequestAnalyzer::parse_arguments_and_input_files(&ovec(cmdline)).unwrap()
    }

    fn expected_args(pairs: &[(&str, &[&str])]) -> Arguments {
        pairs.iter()
            .map(|&(name, values)| {
                (name.to_owned(), values.iter().map(|v| v.to_string()).collect())
            })
            .collect()
    }

    fn analyzed(cmdline: &[&str]) -> AnalysisResult<(Vec<String>, Vec<String>)> {
        RequestAnalyzer::analyze_command_line(&ovec(cmdline))
    }

    fn assert_full(cmdline: &[&str], sources: &[&str], object: &str) {
        let (s, o) = analyzed(cmdline).unwrap();
        assert_eq!(s, ovec(sources));
        assert_eq!(o[0], object);
    }

    // The analysis may fail for other reasons, but a source file must have
    // been recognized.
    fn assert_source_files_ok(cmdline: &[&str]) {
        match analyzed(cmdline) {
            Err(AnalysisError::NoSourceFile) => {
                panic!("unexpected NoSourceFile for {:?}", cmdline)
            }
            _ => {}
        }
    }

    fn assert_fo(fo_argument: &str, expected_object: &str) {
        assert_full(&["/c", fo_argument, "main.cpp"], &["main.cpp"], expected_object);
    }

    #[test]
    fn test_analyze_environment_ok() {
        let env = vec![("SYSTEMROOT".to_owned(), r"C:\Windows".to_owned()),
                       ("INCLUDE".to_owned(), r"C:\Program Files\include".to_owned())];
        assert_eq!(RequestAnalyzer::analyze_environment(&env), Ok(()));
    }

    #[test]
    fn test_analyze_environment_empty_cl() {
        // Setting CL or _CL_ to the empty string is equivalent to unsetting
        // them.
        for var in &["CL", "_CL_"] {
            let env = vec![(var.to_string(), String::new())];
            assert_eq!(RequestAnalyzer::analyze_environment(&env), Ok(()));
        }
    }

    #[test]
    fn test_analyze_environment_cl_set() {
        for var in &["CL", "_CL_"] {
            let env = vec![(var.to_string(), "123".to_owned())];
            assert_eq!(RequestAnalyzer::analyze_environment(&env),
                       Err(AnalysisError::UnsupportedEnvironment));
        }
    }

    #[test]
    fn test_parse_simple() {
        let (arguments, input_files) = parsed(&["/c", "main.cpp"]);
        assert_eq!(arguments, expected_args(&[("c", &[""])]));
        assert_eq!(input_files, ovec(&["main.cpp"]));
    }

    #[test]
    fn test_parse_unknown_options_keep_full_name() {
        let (arguments, input_files) = parsed(&["/link", "unit1.obj", "unit2.obj"]);
        assert_eq!(arguments, expected_args(&[("link", &[""])]));
        assert_eq!(input_files, ovec(&["unit1.obj", "unit2.obj"]));
    }

    #[test]
    fn test_parse_repeated_option_values_in_order() {
        let (arguments, input_files) = parsed(&["/Fo", "/Fooutfile.obj", "main.cpp"]);
        assert_eq!(arguments, expected_args(&[("Fo", &["", "outfile.obj"])]));
        assert_eq!(input_files, ovec(&["main.cpp"]));

        let (arguments, _) = parsed(&["/c", "/I.", "/I", "somedir", "main.cpp"]);
        assert_eq!(arguments, expected_args(&[("c", &[""]), ("I", &[".", "somedir"])]));
    }

    #[test]
    fn test_parse_required_attached_parameter() {
        for name in &["Ob", "Yl", "Zm"] {
            let arg = format!("/{}99", name);
            let (arguments, input_files) = parsed(&["/c", &arg, "main.cpp"]);
            assert_eq!(arguments, expected_args(&[("c", &[""]), (name, &["99"])]));
            assert_eq!(input_files, ovec(&["main.cpp"]));
        }
    }

    #[test]
    fn test_parse_optional_attached_parameter() {
        for name in &["doc", "FA", "Fr", "FR", "Gs", "MP", "Wv", "Yc", "Yu", "Zp", "Fa",
                      "Fd", "Fe", "Fi", "Fm", "Fo", "Fp"] {
            let arg = format!("/{}99", name);
            let (arguments, _) = parsed(&["/c", &arg, "main.cpp"]);
            assert_eq!(arguments, expected_args(&[("c", &[""]), (name, &["99"])]));

            let arg = format!("/{}", name);
            let (arguments, input_files) = parsed(&["/c", &arg, "main.cpp"]);
            assert_eq!(arguments, expected_args(&[("c", &[""]), (name, &[""])]));
            assert_eq!(input_files, ovec(&["main.cpp"]));
        }
    }

    #[test]
    fn test_parse_maybe_separated_parameter() {
        for name in &["FI", "U", "I", "F", "FU", "w1", "w2", "w3", "w4", "wd", "we",
                      "wo", "AI", "D", "V", "Tc", "Tp"] {
            let arg = format!("/{}", name);
            let (arguments, input_files) = parsed(&["/c", &arg, "99", "main.cpp"]);
            assert_eq!(arguments, expected_args(&[("c", &[""]), (name, &["99"])]));
            assert_eq!(input_files, ovec(&["main.cpp"]));

            let arg = format!("/{}99", name);
            let (arguments, _) = parsed(&["/c", &arg, "main.cpp"]);
            assert_eq!(arguments, expected_args(&[("c", &[""]), (name, &["99"])]));
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        // /FI and /FU must not be parsed as /F with an attached parameter.
        let (arguments, _) = parsed(&["/FI99", "main.cpp"]);
        assert_eq!(arguments, expected_args(&[("FI", &["99"])]));
        let (arguments, _) = parsed(&["/FU99", "main.cpp"]);
        assert_eq!(arguments, expected_args(&[("FU", &["99"])]));
        let (arguments, _) = parsed(&["/Fo99", "main.cpp"]);
        assert_eq!(arguments, expected_args(&[("Fo", &["99"])]));
    }

    #[test]
    fn test_analyze_empty() {
        assert_eq!(analyzed(&[]), Err(AnalysisError::NoSourceFile));
    }

    #[test]
    fn test_analyze_simple() {
        assert_full(&["/c", "main.cpp"], &["main.cpp"], "main.obj");
    }

    #[test]
    fn test_analyze_no_source() {
        // No source file has priority over all other failures: it is most
        // likely a misconfigured command line.
        for cmdline in &[&["/c", "/nologo"][..], &["/c"][..], &["/Zi"][..], &["/E"][..],
                         &["/P"][..], &["/EP"][..], &["/Yc"][..], &["/Yu"][..],
                         &["/link"][..]] {
            assert_eq!(analyzed(cmdline), Err(AnalysisError::NoSourceFile),
                       "for {:?}", cmdline);
        }
    }

    #[test]
    fn test_analyze_link() {
        assert_eq!(analyzed(&["main.cpp"]), Err(AnalysisError::CalledForLink));
        assert_eq!(analyzed(&["/nologo", "main.cpp"]), Err(AnalysisError::CalledForLink));
        assert_eq!(analyzed(&["/c", "/link", "main.cpp"]), Err(AnalysisError::CalledForLink));
    }

    #[test]
    fn test_analyze_preprocessing() {
        // /E, /P and /EP make the compiler ignore /Fo and friends, so all
        // of these are preprocessor invocations.
        for pp in &["/E", "/P", "/EP"] {
            assert_eq!(analyzed(&["/c", pp, "main.cpp"]),
                       Err(AnalysisError::CalledForPreprocessing));
            assert_eq!(analyzed(&["/c", pp, "/FoSome.obj", "main.cpp"]),
                       Err(AnalysisError::CalledForPreprocessing));
            assert_eq!(analyzed(&["/c", pp, "/FaListing.asm", "main.cpp"]),
                       Err(AnalysisError::CalledForPreprocessing));
            assert_eq!(analyzed(&["/c", pp, "/FmMapfile.map", "main.cpp"]),
                       Err(AnalysisError::CalledForPreprocessing));
        }
        assert_eq!(analyzed(&["/c", "/P", "/EP", "main.cpp"]),
                   Err(AnalysisError::CalledForPreprocessing));
        assert_eq!(analyzed(&["/c", "/P", "/FiTheOutFile.i", "main.cpp"]),
                   Err(AnalysisError::CalledForPreprocessing));
    }

    #[test]
    fn test_analyze_pch() {
        assert_eq!(analyzed(&["/c", "/Ycstdafx.h", "main.cpp"]),
                   Err(AnalysisError::CalledForPch));
    }

    #[test]
    fn test_analyze_external_debug_info() {
        assert_eq!(analyzed(&["/c", "/Zi", "main.cpp"]),
                   Err(AnalysisError::CalledForExternalDebugInfo));
        assert_eq!(analyzed(&["/c", "/ZI", "main.cpp"]),
                   Err(AnalysisError::CalledForExternalDebugInfo));
        // /Z7 keeps debug information in the object file and stays
        // cacheable.
        assert_full(&["/c", "/Z7", "main.cpp"], &["main.cpp"], "main.obj");
    }

    #[test]
    fn test_analyze_argument_parameters() {
        // Required attached parameter.
        for arg in &["/Ob", "/Yl", "/Zm"] {
            assert_eq!(analyzed(&["/c", arg, "main.cpp"]),
                       Err(AnalysisError::InvalidArgument));
        }
        assert_source_files_ok(&["/c", "/Ob999", "main.cpp"]);
        assert_source_files_ok(&["/c", "/Yl999", "main.cpp"]);
        assert_source_files_ok(&["/c", "/Zm999", "main.cpp"]);

        // Optional parameters must not eat the source file.
        for arg in &["/doc", "/FA", "/Fr", "/FR", "/Gs", "/MP", "/Wv", "/Yc", "/Yu",
                     "/Zp", "/Fa", "/Fi", "/Fd", "/Fe", "/Fm", "/Fo", "/Fp"] {
            assert_source_files_ok(&["/c", arg, "main.cpp"]);
        }

        // Required parameters with optional space do eat the source file.
        for arg in &["/FI", "/U", "/I", "/F", "/FU", "/w1", "/w2", "/w3", "/w4",
                     "/wd", "/we", "/wo", "/AI", "/D", "/V"] {
            assert_eq!(analyzed(&["/c", arg, "main.cpp"]),
                       Err(AnalysisError::NoSourceFile),
                       "for {:?}", arg);
            let attached = format!("{}999", arg);
            assert_source_files_ok(&["/c", &attached, "main.cpp"]);
        }
    }

    #[test]
    fn test_analyze_tc_tp() {
        assert_full(&["/c", "/TcMyCcProgram.c"], &["MyCcProgram.c"], "MyCcProgram.obj");
        assert_full(&["/c", "/TpMyCxxProgram.cpp"], &["MyCxxProgram.cpp"],
                    "MyCxxProgram.obj");
        // A separated parameter swallows what looks like the source file.
        assert_full(&["/c", "/Tc", "main.cpp"], &["main.cpp"], "main.obj");
        assert_full(&["/c", "/Tp", "main.cpp"], &["main.cpp"], "main.obj");

        assert_eq!(analyzed(&["/c", "/Tc", "999", "main.cpp"]),
                   Err(AnalysisError::MultipleSourceFilesComplex));
        assert_eq!(analyzed(&["/c", "/Tp", "999", "main.cpp"]),
                   Err(AnalysisError::MultipleSourceFilesComplex));
        assert_eq!(analyzed(&["/c", "/Tc999", "main.cpp"]),
                   Err(AnalysisError::MultipleSourceFilesComplex));
        assert_eq!(analyzed(&["/c", "/Tp999", "main.cpp"]),
                   Err(AnalysisError::MultipleSourceFilesComplex));
    }

    #[test]
    fn test_analyze_multiple_plain_sources() {
        let (sources, objects) =
            analyzed(&["/c", "first.cpp", "second.cpp"]).unwrap();
        assert_eq!(sources, ovec(&["first.cpp", "second.cpp"]));
        assert_eq!(objects, ovec(&["first.obj", "second.obj"]));
    }

    #[test]
    fn test_output_file() {
        assert_fo("/FoTheOutFile.obj", "TheOutFile.obj");
        assert_fo("/FoTheOutFile.dat", "TheOutFile.dat");
        assert_fo("/FoThe Out File.obj", "The Out File.obj");
    }

    #[test]
    fn test_output_file_normalize_path() {
        // Out dir does not exist: preserve the path, the compiler will
        // complain.
        assert_fo(r"/FoDebug\TheOutFile.obj", r"Debug\TheOutFile.obj");
        assert_fo("/FoDebug/TheOutFile.obj", r"Debug\TheOutFile.obj");
        assert_fo(r"/FoDe\bug/TheOutFile.obj", r"De\bug\TheOutFile.obj");
        assert_fo("/FoDebug//TheOutFile.obj", r"Debug\TheOutFile.obj");
        assert_fo(r"/FoDebug\\TheOutFile.obj", r"Debug\TheOutFile.obj");
    }

    #[test]
    fn test_output_file_dot_directory() {
        assert_fo("/Fo.", r".\main.obj");
    }

    #[test]
    fn test_output_file_trailing_separator_is_a_directory() {
        assert_fo(r"/Fofo-build-debug\\", r"fo-build-debug\main.obj");
    }

    #[test]
    fn test_output_file_existing_directory() {
        let t = TempDir::new("analyze-test").unwrap();
        let dir = t.path().join("fo-build-debug");
        fs::create_dir(&dir).unwrap();
        let dir = dir.display().to_string();
        let fo = format!("/Fo{}", dir);
        assert_fo(&fo, &format!("{}\\main.obj", normpath(&dir)));
    }

    #[test]
    fn test_job_count() {
        let jc = |args: &[&str]| job_count(&ovec(args));
        let cpus = num_cpus::get();

        assert_eq!(jc(&["/MP1"]), 1);
        assert_eq!(jc(&["/MP100"]), 100);
        assert_eq!(jc(&["/MP"]), cpus);

        // Invalid values fall back to a single job.
        assert_eq!(jc(&["/MP100.0"]), 1);
        assert_eq!(jc(&["/MP-100"]), 1);
        assert_eq!(jc(&["/MPfoo"]), 1);

        // The last occurrence wins.
        assert_eq!(jc(&["/MP1", "/MP44"]), 44);
        assert_eq!(jc(&["/MP1", "/MP44", "/MP"]), cpus);

        assert_eq!(jc(&["/c", "/nologo", "/MP44"]), 44);
        assert_eq!(jc(&["/c", "/nologo", "/MP44", "mysource.cpp"]), 44);
        assert_eq!(jc(&["/MP2", "/c", "/nologo", "/MP44", "mysource.cpp"]), 44);
        assert_eq!(jc(&["/MP2", "/c", "/MP44", "/nologo", "/MP", "mysource.cpp"]), cpus);
    }

    #[test]
    fn test_argument_equality_by_kind_and_name() {
        let t1_fo = CompilerArgument { name: "Fo", kind: ArgKind::RequiredAttached };
        let t1_w = CompilerArgument { name: "W", kind: ArgKind::RequiredAttached };
        let t2_w = CompilerArgument { name: "W", kind: ArgKind::OptionalAttached };
        let t3_w = CompilerArgument { name: "W", kind: ArgKind::MaybeSeparated };
        let t4_w = CompilerArgument { name: "W", kind: ArgKind::Separated };

        assert_eq!(t1_fo, CompilerArgument { name: "Fo", kind: ArgKind::RequiredAttached });
        assert!(t1_fo != t1_w);
        assert!(t1_w != t2_w);
        assert!(t2_w != t3_w);
        assert!(t3_w != t4_w);
        assert!(t4_w != t1_w);
    }
}
