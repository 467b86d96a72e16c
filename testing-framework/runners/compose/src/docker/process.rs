use std::{
    collections::VecDeque,
    io,
    process::{ExitStatus, Stdio},
    sync::Arc,
};

use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, BufReader},
    process::{Child, Command},
    sync::watch,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bounded tail of the lines a compose process printed.
#[derive(Clone, Debug, Default)]
pub struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// A running `compose up` process whose output is drained in the background.
///
/// Both pipes are read for the lifetime of the handle so the child never
/// blocks on a full pipe. The child is killed when the handle is dropped.
pub struct ComposeProcessHandle {
    child: Child,
    tail: watch::Receiver<OutputTail>,
    drain: CancellationToken,
    readers: Vec<JoinHandle<()>>,
    exit_status: Option<ExitStatus>,
}

impl ComposeProcessHandle {
    /// Spawn without waiting for the services to come up.
    pub(crate) fn spawn(mut command: Command, tail_lines: usize) -> io::Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let (tail_tx, tail_rx) = watch::channel(OutputTail::with_capacity(tail_lines));
        let tail_tx = Arc::new(tail_tx);
        let drain = CancellationToken::new();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(drain_lines(
                stdout,
                "stdout",
                Arc::clone(&tail_tx),
                drain.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(drain_lines(
                stderr,
                "stderr",
                Arc::clone(&tail_tx),
                drain.clone(),
            )));
        }

        Ok(Self {
            child,
            tail: tail_rx,
            drain,
            readers,
            exit_status: None,
        })
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "compose process exited");
                self.exit_status = Some(status);
                false
            }
            Err(err) => {
                warn!(error = %err, "failed to query compose process state");
                false
            }
        }
    }

    /// Exit status, once `is_alive` has observed the exit.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Most recent line printed on either stream.
    #[must_use]
    pub fn last_line(&self) -> Option<String> {
        self.tail.borrow().last().map(str::to_owned)
    }

    #[must_use]
    pub fn recent_output(&self) -> Vec<String> {
        self.tail.borrow().lines()
    }

    /// Kill the process if still running and stop the output readers.
    pub async fn shutdown(mut self) {
        if self.is_alive() {
            if let Err(err) = self.child.start_kill() {
                warn!(error = %err, "failed to kill compose process");
            }
        }
        match self.child.wait().await {
            Ok(status) => debug!(%status, "compose process reaped"),
            Err(err) => warn!(error = %err, "failed to reap compose process"),
        }

        self.drain.cancel();
        for reader in self.readers.drain(..) {
            if let Err(err) = reader.await {
                warn!(error = %err, "compose output reader failed");
            }
        }
    }
}

impl Drop for ComposeProcessHandle {
    fn drop(&mut self) {
        self.drain.cancel();
    }
}

async fn drain_lines<R>(
    reader: R,
    stream: &'static str,
    tail: Arc<watch::Sender<OutputTail>>,
    token: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    // Container logs are arbitrary bytes: decode lossily and keep reading, a
    // closed pipe would take the child down with SIGPIPE.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            () = token.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                debug!(target: "compose", stream, "{line}");
                tail.send_modify(|tail| tail.push(line));
            }
            Err(err) => {
                warn!(target: "compose", stream, error = %err, "failed to read compose output");
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
