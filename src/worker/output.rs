//! Worker stdout/stderr capture.
//!
//! Both pipes are drained continuously so a chatty worker never blocks on a
//! full pipe. Lines go to tracing at debug level; the last few of each stream
//! are kept for failure diagnostics. The structured result never travels
//! over these pipes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lines kept per stream.
const MAX_CAPTURED_LINES: usize = 50;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: VecDeque<String>,
    stderr: VecDeque<String>,
}

/// Bounded tail of a worker's stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    buffers: Arc<Mutex<Buffers>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task that drains `reader` line by line until EOF.
    pub fn spawn_reader<R>(&self, task_id: Uuid, stream: OutputStream, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let capture = self.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']).to_string();
                        debug!(task_id = %task_id, stream = %stream, line = %line, "Worker output");
                        capture.push(stream, line);
                    }
                    Err(e) => {
                        warn!(task_id = %task_id, stream = %stream, error = %e, "Worker output read failed");
                        break;
                    }
                }
            }
        })
    }

    fn push(&self, stream: OutputStream, line: String) {
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        let buf = match stream {
            OutputStream::Stdout => &mut buffers.stdout,
            OutputStream::Stderr => &mut buffers.stderr,
        };
        if buf.len() == MAX_CAPTURED_LINES {
            buf.pop_front();
        }
        buf.push_back(line);
    }

    /// Last captured lines of `stream`, oldest first.
    pub fn tail(&self, stream: OutputStream, n: usize) -> Vec<String> {
        let buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        let buf = match stream {
            OutputStream::Stdout => &buffers.stdout,
            OutputStream::Stderr => &buffers.stderr,
        };
        buf.iter().skip(buf.len().saturating_sub(n)).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_lines_into_tail() {
        let capture = OutputCapture::new();
        let input: &[u8] = b"one\ntwo\nthree\n";
        capture
            .spawn_reader(Uuid::new_v4(), OutputStream::Stderr, input)
            .await
            .unwrap();

        assert_eq!(capture.tail(OutputStream::Stderr, 2), vec!["two", "three"]);
        assert!(capture.tail(OutputStream::Stdout, 2).is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_stop_draining() {
        let capture = OutputCapture::new();
        let input: &[u8] = b"\xff\xfe page\r\npage 2\nno newline";
        capture
            .spawn_reader(Uuid::new_v4(), OutputStream::Stdout, input)
            .await
            .unwrap();

        let tail = capture.tail(OutputStream::Stdout, 10);
        assert_eq!(tail.len(), 3);
        assert!(tail[0].ends_with(" page"));
        assert_eq!(tail[1], "page 2");
        assert_eq!(tail[2], "no newline");
    }

    #[tokio::test]
    async fn keeps_only_the_last_lines() {
        let capture = OutputCapture::new();
        let input: String = (0..MAX_CAPTURED_LINES + 10)
            .map(|i| format!("line {i}\n"))
            .collect();
        capture
            .spawn_reader(Uuid::new_v4(), OutputStream::Stdout, std::io::Cursor::new(input.into_bytes()))
            .await
            .unwrap();

        let tail = capture.tail(OutputStream::Stdout, usize::MAX);
        assert_eq!(tail.len(), MAX_CAPTURED_LINES);
        assert_eq!(tail.first().unwrap(), "line 10");
    }
}
