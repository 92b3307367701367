//! Server-sent event framing over a blocking reader.
//!
//! The async pipeline emits [`ProgressEvent`]s; the response body is a
//! synchronous `Read` fed one framed event at a time through a channel.
//! The body ends when the sending side hangs up.

use std::io::{self, Read};
use std::sync::mpsc::Receiver;

use deckgen_core::core::events::ProgressEvent;
use tiny_http::Header;

/// Encodes one event as an SSE frame: `data: {json}\n\n`.
pub fn frame(event: &ProgressEvent) -> Vec<u8> {
    let json = serde_json::to_string(event).unwrap_or_else(|_| String::from("{}"));
    format!("data: {json}\n\n").into_bytes()
}

/// Response headers for an event-stream body.
pub fn stream_headers() -> Vec<Header> {
    vec![
        header("Content-Type", "text/event-stream"),
        header("Cache-Control", "no-cache"),
        header("Connection", "keep-alive"),
    ]
}

/// Builds a header from static name/value pairs.
pub fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name, value).expect("valid static header")
}

/// Blocking `Read` over a channel of SSE frames.
pub struct FrameReader {
    rx: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    pos: usize,
}

impl FrameReader {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            buffer: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for FrameReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.buffer.len() {
            match self.rx.recv() {
                Ok(next) => {
                    self.buffer = next;
                    self.pos = 0;
                }
                // Sender gone: every event has been framed, end the body.
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.buffer.len() - self.pos);
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
