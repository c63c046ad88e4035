use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::errors::JavelinError;

/// Captured output from an external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// `stdout` + `stderr` concatenated with a newline separator when needed.
    ///
    /// Build tools interleave useful lines across both streams; parsers
    /// always consume the combined form.
    pub fn combined(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Builder for constructing and executing external processes.
///
/// Provides a fluent API for setting program, arguments, environment
/// variables, working directory, timeout, and a cancellation token.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl CommandBuilder {
    /// Create a new builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            timeout: None,
            cancellation: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory for the child process.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Kill the child and fail the invocation after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kill the child when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Human-readable rendering for logs and error messages.
    pub fn render(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    /// Execute the command and capture its output.
    ///
    /// The child is polled rather than waited on so that cancellation and the
    /// timeout can terminate it; its process exit always releases the reader
    /// threads.
    pub fn exec(&self) -> Result<CommandOutput, JavelinError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %self.render(), "spawning external process");

        let mut child = cmd.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                JavelinError::ToolNotFound {
                    tool: self.program.clone(),
                }
            } else {
                JavelinError::Io(err)
            }
        })?;

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());
        let deadline = self.timeout.map(|t| Instant::now() + t);

        let status = loop {
            if let Some(status) = child.try_wait().map_err(JavelinError::Io)? {
                break status;
            }
            if let Some(ref token) = self.cancellation {
                if token.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    drain(stdout_reader, stderr_reader);
                    return Err(JavelinError::Cancelled);
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let (stdout, stderr) = drain(stdout_reader, stderr_reader);
                    return Err(JavelinError::Invocation {
                        tool: self.program.clone(),
                        code: None,
                        output: format!(
                            "`{}` timed out after {:?}\n{}{}",
                            self.render(),
                            self.timeout.unwrap_or_default(),
                            stdout,
                            stderr
                        ),
                    });
                }
            }
            std::thread::sleep(Duration::from_millis(25));
        };

        let (stdout, stderr) = drain(stdout_reader, stderr_reader);
        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

type ReaderHandle = Option<std::thread::JoinHandle<String>>;

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> ReaderHandle {
    stream.map(|mut stream| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn drain(stdout: ReaderHandle, stderr: ReaderHandle) -> (String, String) {
    let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
    (stdout, stderr)
}

/// Seam for running external commands, so build-tool drivers can be tested
/// against canned output.
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    fn run(&self, cmd: &CommandBuilder) -> Result<CommandOutput, JavelinError>;
}

/// Runner that actually spawns the process.
#[derive(Debug, Clone, Default)]
pub struct DefaultCommandRunner;

impl CommandRunner for DefaultCommandRunner {
    fn run(&self, cmd: &CommandBuilder) -> Result<CommandOutput, JavelinError> {
        cmd.exec()
    }
}
