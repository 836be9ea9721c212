//! Interpreter subprocess with captured output and an optional deadline.
//!
//! On Unix the interpreter leads its own process group, so a deadline kill
//! also reaches anything it forked. Stream readers that outlive the kill are
//! abandoned after a short grace period with whatever they had read.

use anyhow::{bail, Context, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const KILL_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was killed by a signal or by the deadline.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Bytes read so far from one stream, plus a signal sent at end of stream.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(stream: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buf);
        thread::spawn(move || {
            if let Some(mut stream) = stream {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => match sink.lock() {
                            Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                            Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                        },
                    }
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Wait for end of stream, at most `limit` when given, and take the bytes.
    fn finish(self, limit: Option<Duration>) -> Vec<u8> {
        let _ = match limit {
            Some(limit) => self.done.recv_timeout(limit).ok(),
            None => self.done.recv().ok(),
        };
        let mut guard = match self.buf.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard)
    }
}

/// Run `argv` in `cwd`, capturing both streams in emission order per stream.
pub fn run_process(argv: &[String], cwd: &Path, timeout: Option<Duration>) -> Result<ProcessOutput> {
    let Some((program, args)) = argv.split_first() else {
        bail!("Engine command is empty");
    };
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command.spawn().with_context(|| format!("Failed to spawn {program}"))?;

    let stdout = Drain::spawn(child.stdout.take());
    let stderr = Drain::spawn(child.stderr.take());

    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let (exit_code, timed_out) = wait_with_deadline(&mut child, deadline)?;

    // Descendants left running may still hold the pipes open.
    let limit = if timed_out {
        Some(KILL_GRACE)
    } else {
        deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()).max(KILL_GRACE))
    };
    Ok(ProcessOutput {
        stdout: stdout.finish(limit),
        stderr: stderr.finish(limit),
        exit_code,
        timed_out,
    })
}

fn wait_with_deadline(child: &mut Child, deadline: Option<Instant>) -> Result<(Option<i32>, bool)> {
    let Some(deadline) = deadline else {
        let status = child.wait()?;
        return Ok((status.code(), false));
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if Instant::now() >= deadline {
            tracing::warn!("Process {} exceeded its deadline; killing it", child.id());
            kill_tree(child);
            let _ = child.wait();
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let res = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if res != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}
