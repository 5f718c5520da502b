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

//! A small seam over `std::process::Command` so that code invoking the
//! compiler can be tested against canned outputs instead of real child
//! processes.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::Path;
use std::process;
use std::sync::{Arc, Mutex};

/// The methods of `process::Command` the dispatcher uses.
pub trait RunCommand: fmt::Debug {
    fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self;
    fn args<S: AsRef<OsStr>>(&mut self, args: &[S]) -> &mut Self;
    fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self;
    /// Run to completion, capturing stdout and stderr.
    fn output(&mut self) -> io::Result<process::Output>;
    /// Run to completion with inherited stdio.
    fn status(&mut self) -> io::Result<process::ExitStatus>;
}

/// Hands out objects implementing `RunCommand`.
pub trait CommandCreator: Clone + Send + 'static {
    type Cmd: RunCommand;
    fn new_command<S: AsRef<OsStr>>(&self, program: S) -> Self::Cmd;
}

impl RunCommand for process::Command {
    fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        process::Command::arg(self, arg)
    }
    fn args<S: AsRef<OsStr>>(&mut self, args: &[S]) -> &mut Self {
        process::Command::args(self, args)
    }
    fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        process::Command::current_dir(self, dir)
    }
    fn output(&mut self) -> io::Result<process::Output> {
        process::Command::output(self)
    }
    fn status(&mut self) -> io::Result<process::ExitStatus> {
        process::Command::status(self)
    }
}

/// A `CommandCreator` that builds real processes.
#[derive(Clone)]
pub struct ProcessCommandCreator;

impl CommandCreator for ProcessCommandCreator {
    type Cmd = process::Command;
    fn new_command<S: AsRef<OsStr>>(&self, program: S) -> process::Command {
        process::Command::new(program)
    }
}

#[cfg(unix)]
pub fn exit_status(code: i32) -> process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    // The raw wait status puts the exit code in the high byte.
    process::ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: u32) -> process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    process::ExitStatus::from_raw(code)
}

/// A queued output for the next spawned `MockCommand`.
pub struct MockCommand {
    program: OsString,
    arguments: Vec<OsString>,
    output: Option<io::Result<process::Output>>,
}

impl fmt::Debug for MockCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MockCommand {{ program: {:?}, arguments: {:?} }}",
               self.program, self.arguments)
    }
}

impl RunCommand for MockCommand {
    fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.arguments.push(arg.as_ref().to_owned());
        self
    }
    fn args<S: AsRef<OsStr>>(&mut self, args: &[S]) -> &mut Self {
        self.arguments.extend(args.iter().map(|a| a.as_ref().to_owned()));
        self
    }
    fn current_dir<P: AsRef<Path>>(&mut self, _dir: P) -> &mut Self {
        self
    }
    fn output(&mut self) -> io::Result<process::Output> {
        self.output.take().expect("MockCommand run more than once")
    }
    fn status(&mut self) -> io::Result<process::ExitStatus> {
        self.output().map(|o| o.status)
    }
}

/// A `CommandCreator` returning `MockCommand`s that replay queued outputs
/// in FIFO order. Panics when a command is created with nothing queued,
/// which makes a test fail if more processes run than expected.
#[derive(Clone)]
pub struct MockCommandCreator {
    outputs: Arc<Mutex<VecDeque<io::Result<process::Output>>>>,
}

impl MockCommandCreator {
    pub fn new() -> MockCommandCreator {
        MockCommandCreator { outputs: Arc::new(Mutex::new(VecDeque::new())) }
    }

    /// Queue the result of the next command execution.
    pub fn next_command_outputs(&self, output: io::Result<process::Output>) {
        self.outputs.lock().unwrap().push_back(output);
    }

    pub fn remaining(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }
}

impl CommandCreator for MockCommandCreator {
    type Cmd = MockCommand;
    fn new_command<S: AsRef<OsStr>>(&self, program: S) -> MockCommand {
        let output = self.outputs.lock().unwrap().pop_front()
            .expect("no mock command output queued");
        MockCommand {
            program: program.as_ref().to_owned(),
            arguments: vec![],
            output: Some(output),
        }
    }
}

/// Shorthand for a `process::Output` built from an exit code and the two
/// streams.
pub fn mock_output(code: i32, stdout: &str, stderr: &str) -> process::Output {
    process::Output {
        status: exit_status(code as _),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}
