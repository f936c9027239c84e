//! Runs one shell command and streams its output.
//!
//! The child is spawned in its own process group before [`start`] returns, so
//! [`OutputStream::terminate`] reaches everything the shell started. A
//! supervisor thread owns the child. Two reader threads scan stdout and stderr
//! and send every line over a rendezvous channel; once both have hit
//! end-of-stream the supervisor waits for the exit status and sends a single
//! [`OutputEvent::Done`]. The receiving side never blocks on the child.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::thread;

use tracing::{debug, warn};

use crate::config::ShellConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Line { text: String, is_error: bool },
    Done { failure: Option<String> },
}

/// Consumer side of a running command.
pub struct OutputStream {
    rx: Receiver<OutputEvent>,
    /// Process group id of the shell, absent when the launch failed.
    pgid: Option<u32>,
    finished: Arc<AtomicBool>,
}

impl OutputStream {
    /// Returns the next event if one is ready. Yields `Done` once the
    /// stream is closed.
    pub fn try_recv(&self) -> Option<OutputEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(OutputEvent::Done { failure: None }),
        }
    }

    /// Kills the shell and every process in its group if the run is still
    /// in progress.
    pub fn terminate(&self) {
        let Some(pgid) = self.pgid else {
            return;
        };
        if self.finished.load(Ordering::Acquire) {
            return;
        }
        match kill_group(pgid) {
            Ok(()) => debug!(pgid, "terminated running command"),
            Err(err) => warn!(pgid, error = %err, "failed to terminate running command"),
        }
    }
}

/// Starts `command_line` under the configured shell.
///
/// Never blocks on the child. A launch failure is reported as the stream's
/// only event.
pub fn start(command_line: &str, shell: &ShellConfig) -> OutputStream {
    let (tx, rx) = mpsc::sync_channel::<OutputEvent>(0);
    let finished = Arc::new(AtomicBool::new(false));

    let child = match shell_command(command_line, shell).spawn() {
        Ok(child) => child,
        Err(err) => {
            debug!(command = command_line, error = %err, "failed to start command");
            thread::spawn(move || {
                let _ = tx.send(OutputEvent::Done {
                    failure: Some(format!("failed to start shell: {err}")),
                });
            });
            return OutputStream {
                rx,
                pgid: None,
                finished,
            };
        }
    };

    let pgid = child.id();
    debug!(command = command_line, pid = pgid, "command started");
    let flag = Arc::clone(&finished);
    let command_line = command_line.to_string();
    thread::spawn(move || supervise(child, &command_line, &flag, &tx));

    OutputStream {
        rx,
        pgid: Some(pgid),
        finished,
    }
}

fn shell_command(command_line: &str, shell: &ShellConfig) -> Command {
    let mut process = Command::new(&shell.program);
    process.args(&shell.args).arg(command_line);
    apply_color_env(&mut process);
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // The shell leads a new group; pipelines and background jobs join it.
        process.process_group(0);
    }
    process
}

fn apply_color_env(process: &mut Command) {
    process
        .env("CLICOLOR_FORCE", "1")
        .env("FORCE_COLOR", "1")
        .env(
            "TERM",
            std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string()),
        );
}

#[cfg(unix)]
fn kill_group(pgid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid).map_err(io::Error::other)?;
    // SAFETY: killpg only sends a signal; it touches no memory of ours.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // The whole group already exited.
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn kill_group(pid: u32) -> io::Result<()> {
    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill exited with {status}")))
    }
}

fn supervise(
    mut child: Child,
    command_line: &str,
    finished: &AtomicBool,
    tx: &SyncSender<OutputEvent>,
) {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill();
        let _ = child.wait();
        finished.store(true, Ordering::Release);
        let _ = tx.send(OutputEvent::Done {
            failure: Some("failed to capture command output".to_string()),
        });
        return;
    };

    let stdout_reader = spawn_stream_reader(stdout, false, tx.clone());
    let stderr_reader = spawn_stream_reader(stderr, true, tx.clone());
    let read_failure = [stdout_reader.join(), stderr_reader.join()]
        .into_iter()
        .find_map(|joined| match joined {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("failed to read output: {err}")),
            Err(_) => Some("output reader panicked".to_string()),
        });

    let failure = match child.wait() {
        Ok(status) if status.success() => read_failure,
        Ok(status) => Some(status.to_string()),
        Err(err) => Some(format!("failed to wait for command: {err}")),
    };
    // Once reaped the group id may be reused, so terminate stops here.
    finished.store(true, Ordering::Release);
    debug!(command = command_line, failure = ?failure, "command finished");
    let _ = tx.send(OutputEvent::Done { failure });
}

fn spawn_stream_reader<R: Read + Send + 'static>(
    reader: R,
    is_error: bool,
    tx: SyncSender<OutputEvent>,
) -> thread::JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        let mut buffered = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            if buffered.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&line)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            if tx.send(OutputEvent::Line { text, is_error }).is_err() {
                // Consumer is gone; nothing left to deliver to.
                return Ok(());
            }
        }
    })
}
