use crate::adapters::ValidatedCommand;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::time::timeout;

pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Ran to completion. `exit_code` is -1 when the process died from a signal.
    Exited {
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    TimedOut {
        after: Duration,
    },
    NotFound {
        program: String,
    },
    Failed {
        message: String,
    },
}

impl ProcessOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { exit_code: 0, .. })
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ValidatedCommand, deadline: Duration) -> ProcessOutcome;
}

/// Runs the command as a real child process with all three stdio streams
/// piped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, command: &ValidatedCommand, deadline: Duration) -> ProcessOutcome {
        let started = Instant::now();
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::error!(program = %command.program, "CLI executable not found");
                return ProcessOutcome::NotFound {
                    program: command.program.clone(),
                };
            }
            Err(error) => {
                tracing::error!(program = %command.program, error = %error, "failed to spawn CLI process");
                return ProcessOutcome::Failed {
                    message: format!("failed to spawn process: {}", error),
                };
            }
        };

        // Readers start before stdin is fed so a chatty child cannot fill its
        // pipes while we are still writing the prompt.
        let stdout_task = tokio::spawn(capture(child.stdout.take()));
        let stderr_task = tokio::spawn(capture(child.stderr.take()));
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();
        let stdin = child.stdin.take();
        let payload = command.stdin.as_deref().unwrap_or_default().as_bytes();

        let completion = async {
            feed_stdin(stdin, payload).await?;
            let status = child.wait().await?;
            let stdout = stdout_task.await.map_err(io::Error::other)??;
            let stderr = stderr_task.await.map_err(io::Error::other)??;
            Ok::<_, io::Error>((status, stdout, stderr))
        };
        let finished = timeout(deadline, completion).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match finished {
            Ok(Ok((status, stdout, stderr))) => {
                let exit_code = status.code().unwrap_or(-1);
                tracing::debug!(
                    program = %command.program,
                    exit_code,
                    elapsed_ms,
                    stdout_bytes = stdout.len(),
                    stderr_bytes = stderr.len(),
                    "CLI process exited"
                );
                ProcessOutcome::Exited {
                    exit_code,
                    stdout,
                    stderr,
                }
            }
            Ok(Err(error)) => {
                stdout_abort.abort();
                stderr_abort.abort();
                let _ = child.start_kill();
                tracing::error!(program = %command.program, error = %error, elapsed_ms, "CLI communication failed");
                ProcessOutcome::Failed {
                    message: error.to_string(),
                }
            }
            Err(_) => {
                stdout_abort.abort();
                stderr_abort.abort();
                terminate(&mut child).await;
                tracing::error!(
                    program = %command.program,
                    timeout_secs = deadline.as_secs_f64(),
                    "CLI execution timed out"
                );
                ProcessOutcome::TimedOut { after: deadline }
            }
        }
    }
}

async fn capture<R>(stream: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn feed_stdin(stdin: Option<ChildStdin>, payload: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    let written = match stdin.write_all(payload).await {
        Ok(()) => stdin.shutdown().await,
        Err(error) => Err(error),
    };
    match written {
        Ok(()) => Ok(()),
        // The exit status decides the outcome when the child stops reading early.
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!(prompt_bytes = payload.len(), "CLI closed stdin before reading the full prompt");
            Ok(())
        }
        Err(error) => Err(error),
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    if timeout(KILL_GRACE_PERIOD, child.wait()).await.is_err() {
        tracing::error!(
            pid = ?child.id(),
            grace_secs = KILL_GRACE_PERIOD.as_secs(),
            "process did not exit after termination signal"
        );
        let _ = child.start_kill();
    }
}
