//! Terminal spinners, and a log writer that prints above them.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::future::Future;
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

static DISPLAY: OnceLock<MultiProgress> = OnceLock::new();

fn display() -> &'static MultiProgress {
    DISPLAY.get_or_init(|| {
        MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(10))
    })
}

/// A spinner with `message`, ticking until finished
pub fn spinner(message: &str) -> ProgressBar {
    let pb = display().add(ProgressBar::new_spinner());
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Show a spinner while `fut` runs
pub async fn with_spinner<F: Future>(message: &str, fut: F) -> F::Output {
    let pb = spinner(message);
    let output = fut.await;
    pb.finish_and_clear();
    output
}

fn emit(line: &str) {
    let line = line.trim_end_matches('\r');
    let display = display();
    if display.is_hidden() {
        eprintln!("{}", line);
    } else {
        let _ = display.println(line);
    }
}

/// `MakeWriter` for `tracing_subscriber` that routes log lines through the
/// spinner display
#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Buffers partial writes and prints complete lines
pub struct LogWriter {
    pending: String,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            emit(line.trim_end_matches('\n'));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            emit(line.trim_end_matches('\n'));
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            pending: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_spinner_returns_output() {
        let value = with_spinner("working", async { 41 + 1 }).await;
        assert_eq!(value, 42);
    }

    #[test]
    fn test_writer_accepts_partial_lines() {
        let mut writer = LogWriterFactory.make_writer();
        assert_eq!(writer.write(b"half").unwrap(), 4);
        assert_eq!(writer.write(b" line\nnext").unwrap(), 10);
        assert!(writer.flush().is_ok());
        assert!(writer.pending.is_empty());
    }
}
