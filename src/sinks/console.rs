use std::io::{self, Write};

use parking_lot::Mutex;
use serde_json::Value;

use super::EventSink;
use crate::error::SinkError;
use crate::events::LifecyclePhase;

/// Renders the stream for a terminal: text as it arrives, a banner per tool call.
/// Flushes after every write so partial text shows up immediately.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl Default for ConsoleSink<io::Stdout> {
    fn default() -> Self {
        Self::stdout()
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: Mutex::new(writer),
        }
    }

    fn write(&self, s: &str) -> Result<(), SinkError> {
        let mut out = self.out.lock();
        out.write_all(s.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn on_text(&self, content: &str, _is_final: bool) -> Result<(), SinkError> {
        self.write(content)
    }

    fn on_tool_start(&self, name: &str, _input: &Value) -> Result<(), SinkError> {
        self.write(&format!("\n[Using tool: {name}]\n"))
    }

    fn on_lifecycle(&self, phase: LifecyclePhase, reason: Option<&str>) -> Result<(), SinkError> {
        match phase {
            LifecyclePhase::Complete => self.write("\n"),
            LifecyclePhase::ForceStop => {
                self.write(&format!("\n[stopped: {}]\n", reason.unwrap_or("unknown")))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AgentEvent;
    use crate::sinks::deliver;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Cloneable in-memory writer so the test can read what the sink wrote.
    #[derive(Clone, Default)]
    struct SharedBuf {
        bytes: Arc<Mutex<Vec<u8>>>,
        flushes: Arc<AtomicUsize>,
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.bytes.lock().clone()).unwrap()
        }

        fn flushes(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.bytes.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn text_is_written_without_newlines() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        deliver(&sink, &AgentEvent::text("Hello")).unwrap();
        deliver(&sink, &AgentEvent::text(" world")).unwrap();

        assert_eq!(buf.contents(), "Hello world");
    }

    #[test]
    fn tool_start_prints_banner() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        deliver(
            &sink,
            &AgentEvent::tool_start("get_fund_info", json!({"fundCode": "000001"})),
        )
        .unwrap();

        let out = buf.contents();
        assert!(out.contains("[Using tool: get_fund_info]"), "got: {out}");
    }

    #[test]
    fn complete_ends_the_line() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        deliver(&sink, &AgentEvent::text("done")).unwrap();
        deliver(&sink, &AgentEvent::lifecycle(LifecyclePhase::Complete)).unwrap();

        assert_eq!(buf.contents(), "done\n");
    }

    #[test]
    fn every_write_is_flushed() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::new(buf.clone());

        deliver(&sink, &AgentEvent::text("Hel")).unwrap();
        assert_eq!(buf.flushes(), 1);
        deliver(&sink, &AgentEvent::text("lo")).unwrap();
        deliver(&sink, &AgentEvent::tool_start("get_fund_info", json!({}))).unwrap();
        assert_eq!(buf.flushes(), 3);

        // Events the console does not render write nothing and flush nothing.
        deliver(&sink, &AgentEvent::lifecycle(LifecyclePhase::Init)).unwrap();
        assert_eq!(buf.flushes(), 3);
    }

    #[test]
    fn write_errors_surface() {
        let sink = ConsoleSink::new(BrokenPipe);
        let err = deliver(&sink, &AgentEvent::text("x")).unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
