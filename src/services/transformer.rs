use crate::config::AppConfig;
use crate::models::{TransformRequest, TransformResult};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Runs one encrypt/decrypt transform from an input file to an output file.
#[async_trait::async_trait]
pub trait Transformer: Send + Sync {
    async fn run(&self, request: &TransformRequest) -> TransformResult;

    /// Short human-readable description used by the health endpoint.
    fn describe(&self) -> String;
}

/// External executable invoked as
/// `<program> [leading args...] <encrypt|decrypt> <input> <output>`.
///
/// Arguments are passed as an argument vector, so file names never reach a
/// shell. On unix the tool runs in its own process group, and the whole group
/// is killed once the tool exits, outlives `timeout`, or the request awaiting
/// it is dropped. Nothing the tool spawned can write into the storage area
/// after the request's files are released.
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ExternalTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.transform_tool.clone())
            .with_args(config.transform_tool_args.clone())
            .with_timeout(config.transform_timeout)
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, request: &TransformRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg(request.operation.keyword())
            .arg(&request.input_path)
            .arg(&request.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Kills the tool's process group when dropped.
struct ProcessGroup {
    pid: Option<u32>,
}

impl ProcessGroup {
    fn kill(&self) {
        if let Some(pid) = self.pid {
            kill_group(pid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

// Without process groups only the direct child is killed, via `kill_on_drop`.
#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn failure_message(program: &str, status: ExitStatus, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if stderr.is_empty() {
        format!("{} exited with {}", program, status)
    } else {
        stderr
    }
}

#[async_trait::async_trait]
impl Transformer for ExternalTool {
    async fn run(&self, request: &TransformRequest) -> TransformResult {
        let mut child = match self.command(request).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start transform tool '{}': {}", self.program, e);
                return TransformResult::Failure {
                    message: format!("Failed to start {}: {}", self.program, e),
                };
            }
        };

        let group = ProcessGroup { pid: child.id() };
        debug!(
            "⚙️  {} {} started (pid {:?})",
            self.program, request.operation, group.pid
        );

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                group.kill();
                let _ = child.wait().await;
                error!("Failed to wait for transform tool '{}': {}", self.program, e);
                return TransformResult::Failure {
                    message: format!("Failed to wait for {}: {}", self.program, e),
                };
            }
            Err(_) => {
                group.kill();
                let _ = child.kill().await;
                stdout.abort();
                stderr.abort();
                warn!(
                    "⏱️  {} {} exceeded {:?}, killed",
                    self.program, request.operation, self.timeout
                );
                return TransformResult::TimedOut {
                    after: self.timeout,
                };
            }
        };

        // Stray background processes would otherwise hold the pipes open.
        group.kill();
        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();

        if !stdout.is_empty() {
            debug!(
                "{} stdout: {}",
                self.program,
                String::from_utf8_lossy(&stdout).trim()
            );
        }

        if status.success() {
            return TransformResult::Success {
                output_path: request.output_path.clone(),
            };
        }

        let message = failure_message(&self.program, status, &stderr);
        warn!(
            "{} {} failed with {}: {}",
            self.program, request.operation, status, message
        );
        TransformResult::Failure { message }
    }

    fn describe(&self) -> String {
        if self.leading_args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.leading_args.join(" "))
        }
    }
}
