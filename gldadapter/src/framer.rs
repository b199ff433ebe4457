/// Line framing for simulator console output
///
/// The debugger prompt arrives without a newline, so output cannot be
/// framed by a plain line reader. The framer walks the stream one
/// character at a time and emits a message on a newline, on a bare
/// carriage return, on the trailing space of the prompt sentinel, or
/// when the buffer fills.
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::events::{LifecycleEvent, OutputChannel, ProcessEvent};

/// The debugger prompt as the simulator prints it, trailing space included
pub const PROMPT: &str = "GLD> ";

const BUFFER_CAPACITY: usize = 1024;

/// Incremental message framer for one output stream
pub struct LineFramer {
    buffer: String,
    last_char: char,
    have_return: bool,
}

impl LineFramer {
    pub fn new() -> LineFramer {
        LineFramer {
            buffer: String::with_capacity(BUFFER_CAPACITY),
            last_char: ' ',
            have_return: false,
        }
    }

    /// Feed one character, appending any completed messages to `out`.
    pub fn push(&mut self, ch: char, out: &mut Vec<String>) {
        // a carriage return not followed by a newline ends the message
        if self.have_return && ch != '\n' {
            self.buffer.push('\n');
            out.push(std::mem::take(&mut self.buffer));
        }
        self.buffer.push(ch);
        self.have_return = ch == '\r';

        // the prompt sentinel ends with "> " and never gets a newline
        if self.last_char == '>' && ch == ' ' {
            let trimmed = self.buffer.trim();
            if trimmed == PROMPT.trim_end() {
                out.push(trimmed.to_string());
                self.buffer.clear();
            }
        }

        if self.buffer.len() >= BUFFER_CAPACITY || ch == '\n' {
            out.push(std::mem::take(&mut self.buffer));
        }
        self.last_char = ch;
    }

    /// Flush whatever is buffered when the stream closes.
    pub fn finish(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
    }
}

impl Default for LineFramer {
    fn default() -> LineFramer {
        LineFramer::new()
    }
}

/// Spawn a task that frames one output stream into session events.
///
/// On end of stream the remainder is flushed and a finished lifecycle
/// event is sent; a read error is logged and treated as end of stream.
pub(crate) fn spawn_reader<R>(
    mut stream: R,
    channel: OutputChannel,
    events: mpsc::UnboundedSender<ProcessEvent>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framer = LineFramer::new();
        let mut chunk = [0u8; BUFFER_CAPACITY];
        let mut messages = Vec::new();
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break, // EOF reached
                Ok(n) => {
                    for &byte in &chunk[..n] {
                        framer.push(byte as char, &mut messages);
                    }
                    for message in messages.drain(..) {
                        let event = ProcessEvent::Output { channel, message };
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    log::error!("Error reading simulator {}: {}", channel, e);
                    break;
                }
            }
        }

        framer.finish(&mut messages);
        for message in messages.drain(..) {
            let _ = events.send(ProcessEvent::Output { channel, message });
        }
        log::debug!("Simulator {} closed", channel);
        let _ = events.send(ProcessEvent::Lifecycle(LifecycleEvent::Finished));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(framer: &mut LineFramer, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        for ch in text.chars() {
            framer.push(ch, &mut out);
        }
        out
    }

    #[test]
    fn test_newline_frames_message() {
        let mut framer = LineFramer::new();
        let out = feed(&mut framer, "hello world\nsecond\n");
        assert_eq!(out, vec!["hello world\n", "second\n"]);
    }

    #[test]
    fn test_crlf_stays_one_message() {
        let mut framer = LineFramer::new();
        let out = feed(&mut framer, "line one\r\nline two\r\n");
        assert_eq!(out, vec!["line one\r\n", "line two\r\n"]);
    }

    #[test]
    fn test_bare_return_gets_synthetic_newline() {
        let mut framer = LineFramer::new();
        let out = feed(&mut framer, "progress\rnext");
        assert_eq!(out, vec!["progress\r\n"]);

        let mut rest = Vec::new();
        framer.finish(&mut rest);
        assert_eq!(rest, vec!["next"]);
    }

    #[test]
    fn test_prompt_is_flushed_trimmed() {
        let mut framer = LineFramer::new();
        let out = feed(&mut framer, "GLD> ");
        assert_eq!(out, vec!["GLD>"]);
    }

    #[test]
    fn test_prompt_after_output_line() {
        let mut framer = LineFramer::new();
        let out = feed(&mut framer, "DEBUG: time 2000-01-01 00:00:00 UTC\r\nGLD> ");
        assert_eq!(out, vec!["DEBUG: time 2000-01-01 00:00:00 UTC\r\n", "GLD>"]);
    }

    #[test]
    fn test_prompt_embedded_in_text_is_not_flushed() {
        let mut framer = LineFramer::new();
        let out = feed(&mut framer, "xGLD> more\n");
        assert_eq!(out, vec!["xGLD> more\n"]);
    }

    #[test]
    fn test_prompt_split_across_pushes() {
        // simulates the sentinel arriving in separate reads
        let mut framer = LineFramer::new();
        let mut out = Vec::new();
        for ch in "GLD".chars() {
            framer.push(ch, &mut out);
        }
        assert!(out.is_empty());
        framer.push('>', &mut out);
        assert!(out.is_empty());
        framer.push(' ', &mut out);
        assert_eq!(out, vec!["GLD>"]);
    }

    #[test]
    fn test_buffer_capacity_flush() {
        let mut framer = LineFramer::new();
        let long = "a".repeat(1500);
        let mut out = feed(&mut framer, &long);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 1024);

        framer.finish(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].len(), 476);
    }

    #[test]
    fn test_finish_flushes_partial_line() {
        let mut framer = LineFramer::new();
        let mut out = feed(&mut framer, "no newline here");
        assert!(out.is_empty());
        framer.finish(&mut out);
        assert_eq!(out, vec!["no newline here"]);

        // nothing buffered, nothing emitted
        let mut empty = Vec::new();
        framer.finish(&mut empty);
        assert!(empty.is_empty());
    }
}
