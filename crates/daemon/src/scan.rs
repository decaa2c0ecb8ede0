// Secret gate: scans snapshot diffs before they leave the machine.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const GITLEAKS_PROGRAM: &str = "gitleaks";
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanVerdict {
    pub secrets_found: bool,
    /// Redacted scanner output, empty when clean.
    pub report: String,
}

impl ScanVerdict {
    pub fn clean() -> Self {
        Self { secrets_found: false, report: String::new() }
    }
}

#[derive(Debug)]
pub enum ScanError {
    Spawn(std::io::Error),
    Io(std::io::Error),
    TimedOut(Duration),
    Failed { code: Option<i32>, output: String },
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Spawn(e) => write!(f, "failed to start secret scanner: {e}"),
            ScanError::Io(e) => write!(f, "secret scanner I/O error: {e}"),
            ScanError::TimedOut(limit) => {
                write!(f, "secret scanner timed out after {}s", limit.as_secs())
            }
            ScanError::Failed { code, output } => {
                write!(f, "secret scanner failed with code {code:?}: {}", output.trim())
            }
        }
    }
}

impl Error for ScanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScanError::Spawn(e) | ScanError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub trait SecretGate: Send + Sync {
    fn is_available(&self) -> bool;

    fn scan(&self, text: &str) -> Result<ScanVerdict, ScanError>;
}

/// Gate backed by the `gitleaks` binary reading the diff from stdin.
///
/// Exit code 0 is clean, 1 means leaks were found, anything else is a
/// scanner failure.
#[derive(Debug, Clone)]
pub struct GitleaksGate {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl Default for GitleaksGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GitleaksGate {
    pub fn new() -> Self {
        Self::with_program(GITLEAKS_PROGRAM)
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into(), leading_args: Vec::new(), timeout: SCAN_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args);
        command
    }
}

impl SecretGate for GitleaksGate {
    fn is_available(&self) -> bool {
        self.command()
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn scan(&self, text: &str) -> Result<ScanVerdict, ScanError> {
        let mut child = self
            .command()
            .args(["detect", "--no-git", "--verbose", "--redact", "--pipe"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ScanError::Spawn)?;

        let stdin = child.stdin.take();
        let input = text.to_owned();
        let writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_with_deadline(&mut child, self.timeout)?;

        // A scanner that exits before draining stdin breaks the pipe; its
        // exit code is still authoritative.
        let _ = writer.join();
        let mut report = join_reader(stdout);
        let errors = join_reader(stderr);
        if !errors.trim().is_empty() {
            if !report.is_empty() && !report.ends_with('\n') {
                report.push('\n');
            }
            report.push_str(&errors);
        }

        match status.code() {
            Some(0) => Ok(ScanVerdict::clean()),
            Some(1) => Ok(ScanVerdict { secrets_found: true, report }),
            code => Err(ScanError::Failed { code, output: report }),
        }
    }
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus, ScanError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(ScanError::Io)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ScanError::TimedOut(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
