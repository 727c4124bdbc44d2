use crate::layout::ProjectLayout;
use crate::process::ProcessConfig;
use chrono::{DateTime, Utc};
use dojo_harness_core::{HarnessError, LaunchMode, OutputStream, ProcessOutput, Result};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs executables from a project layout and collects their output
#[derive(Debug, Clone)]
pub struct CommandRunner {
    layout: ProjectLayout,
}

impl CommandRunner {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    pub fn discover() -> Self {
        Self::new(ProjectLayout::discover())
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Run `program` with an exact argument vector in the project root and
    /// wait for it to exit.
    ///
    /// `env` replaces the child's environment when given; `None` inherits ours.
    pub fn run_command<P, S>(
        &self,
        program: P,
        args: &[S],
        env: Option<&HashMap<String, String>>,
    ) -> Result<ProcessOutput>
    where
        P: AsRef<Path>,
        S: AsRef<OsStr>,
    {
        self.run_with_mode(program, args, env, LaunchMode::Direct)
    }

    /// `run_command` on the layout's binary
    pub fn run_dojo<S: AsRef<OsStr>>(
        &self,
        args: &[S],
        env: Option<&HashMap<String, String>>,
    ) -> Result<ProcessOutput> {
        self.run_command(self.layout.executable(), args, env)
    }

    /// Historical behaviour: an environment override switches to a shell
    /// launch of the space-joined command line, so arguments containing
    /// spaces, quotes or globs are re-split by `/bin/sh`.
    pub fn run_legacy<P, S>(
        &self,
        program: P,
        args: &[S],
        env: Option<&HashMap<String, String>>,
    ) -> Result<ProcessOutput>
    where
        P: AsRef<Path>,
        S: AsRef<OsStr>,
    {
        let mode = if env.is_some() {
            warn!(
                program = %program.as_ref().display(),
                "Environment override given, launching through the shell; argument boundaries may change"
            );
            LaunchMode::Shell
        } else {
            LaunchMode::Direct
        };
        self.run_with_mode(program, args, env, mode)
    }

    pub fn run_with_mode<P, S>(
        &self,
        program: P,
        args: &[S],
        env: Option<&HashMap<String, String>>,
        mode: LaunchMode,
    ) -> Result<ProcessOutput>
    where
        P: AsRef<Path>,
        S: AsRef<OsStr>,
    {
        let config = ProcessConfig::new()
            .with_working_directory(self.layout.root())
            .with_env(env.cloned())
            .with_mode(mode);
        execute(program.as_ref().as_os_str(), args, &config)
    }

    /// Run a raw command string through `/bin/sh -c`, inheriting our
    /// environment and current directory.
    pub fn run_shell(&self, command: &str) -> Result<ProcessOutput> {
        let config = ProcessConfig::new().with_mode(LaunchMode::Shell);
        let no_args: [&str; 0] = [];
        execute(OsStr::new(command), &no_args, &config)
    }

    /// The line handed to `bash -c`: source the helper script, then run
    /// the binary with space-joined arguments.
    pub fn bash_function_command_line<S: AsRef<str>>(&self, args: &[S]) -> String {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        format!(
            "source {} && {} {}",
            self.layout.bash_function_script().display(),
            self.layout.executable().display(),
            args.join(" ")
        )
    }

    /// Start the binary under `bash` after sourcing the bash-function
    /// script. Returns as soon as the child is running.
    pub fn spawn_dojo_with_bash_function<S: AsRef<str>>(
        &self,
        args: &[S],
        env: Option<&HashMap<String, String>>,
    ) -> Result<LiveProcess> {
        let bash = which::which("bash").map_err(|e| HarnessError::ShellNotFound(e.to_string()))?;
        let line = self.bash_function_command_line(args);

        debug!(bash = %bash.display(), command = %line, "Spawning with bash function");

        let mut command = Command::new(&bash);
        command
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        ProcessConfig::new()
            .with_working_directory(self.layout.root())
            .with_env(env.cloned())
            .apply(&mut command);

        let started_at = Utc::now();
        let start = Instant::now();
        let child = command.spawn().map_err(|source| {
            error!(program = %bash.display(), error = %source, "Failed to spawn bash");
            HarnessError::Spawn {
                program: bash.display().to_string(),
                source,
            }
        })?;

        info!(pid = child.id(), command = %line, "Process started");

        Ok(LiveProcess {
            child,
            program: bash,
            args: vec!["-c".to_string(), line],
            started_at,
            start,
        })
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::discover()
    }
}

/// A child that is still running; the caller decides when to wait.
#[derive(Debug)]
pub struct LiveProcess {
    child: Child,
    program: PathBuf,
    args: Vec<String>,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl LiveProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub fn write_stdin(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "stdin already closed")
        })?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(())
    }

    pub fn close_stdin(&mut self) {
        drop(self.child.stdin.take());
    }

    pub fn into_child(self) -> Child {
        self.child
    }

    /// Hand the stdin pipe to the caller, e.g. to feed it from another
    /// thread while `wait` drains stdout and stderr.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Close stdin, wait for exit and decode what was captured.
    pub fn wait(self) -> Result<ProcessOutput> {
        let output = self.child.wait_with_output()?;
        finish(
            &self.program.display().to_string(),
            self.args,
            LaunchMode::Shell,
            output,
            self.started_at,
            self.start,
        )
    }
}

/// Strict UTF-8 decoding; invalid bytes are an error naming the stream.
pub fn decode_utf8(bytes: Vec<u8>, stream: OutputStream) -> Result<String> {
    String::from_utf8(bytes).map_err(|source| HarnessError::InvalidUtf8 { stream, source })
}

fn execute<S: AsRef<OsStr>>(
    program: &OsStr,
    args: &[S],
    config: &ProcessConfig,
) -> Result<ProcessOutput> {
    let started_at = Utc::now();
    let start = Instant::now();
    let program_display = program.to_string_lossy().into_owned();

    debug!(program = %program_display, mode = ?config.mode, "Launching process");

    let output = config
        .build_command(program, args)
        .output()
        .map_err(|source| {
            error!(program = %program_display, error = %source, "Failed to launch process");
            HarnessError::Spawn {
                program: program_display.clone(),
                source,
            }
        })?;

    let args = args
        .iter()
        .map(|arg| arg.as_ref().to_string_lossy().into_owned())
        .collect();
    finish(&program_display, args, config.mode, output, started_at, start)
}

fn finish(
    program: &str,
    args: Vec<String>,
    mode: LaunchMode,
    output: std::process::Output,
    started_at: DateTime<Utc>,
    start: Instant,
) -> Result<ProcessOutput> {
    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code();
    let stdout = decode_utf8(output.stdout, OutputStream::Stdout)?;
    let stderr = decode_utf8(output.stderr, OutputStream::Stderr)?;

    let result = ProcessOutput {
        program: program.to_string(),
        args,
        mode,
        exit_code,
        stdout,
        stderr,
        duration_ms,
        started_at,
        completed_at: Utc::now(),
    };

    info!(
        command = %result.command_line(),
        mode = ?mode,
        exit_code = ?exit_code,
        duration_ms,
        "Process completed"
    );

    Ok(result)
}
