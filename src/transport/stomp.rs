//! Minimal STOMP 1.2 frame codec.
//!
//! Only what a subscribing client needs: CONNECT, SUBSCRIBE, UNSUBSCRIBE and
//! DISCONNECT going out; CONNECTED, MESSAGE, RECEIPT and ERROR coming in.
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```

use crate::{Error, Result};

pub const CONNECT: &str = "CONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
pub const DISCONNECT: &str = "DISCONNECT";
pub const MESSAGE: &str = "MESSAGE";
pub const RECEIPT: &str = "RECEIPT";
pub const ERROR: &str = "ERROR";

const NUL: u8 = 0;

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    /// Headers in wire order; on repeats the first occurrence wins
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame for STOMP 1.2 with heart-beating disabled.
    pub fn connect(host: &str) -> Self {
        Frame::new(CONNECT)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(SUBSCRIBE)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(UNSUBSCRIBE).header("id", id)
    }

    pub fn disconnect() -> Self {
        Frame::new(DISCONNECT)
    }

    /// Human-readable reason carried by an ERROR frame.
    pub fn error_message(&self) -> String {
        let summary = self.get("message").unwrap_or("broker error");
        let detail = self.body.trim();
        if detail.is_empty() {
            summary.to_string()
        } else {
            format!("{}: {}", summary, detail)
        }
    }

    /// Serialize to wire text, NUL terminated.
    pub fn encode(&self) -> String {
        let escape = escapes_headers(&self.command);
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL as char);
        out
    }

    /// Decode exactly one frame. Returns `None` for a heart-beat.
    pub fn decode(text: &str) -> Result<Option<Frame>> {
        let mut frames = decode_frames(text)?;
        match frames.len() {
            0 => Ok(None),
            1 => Ok(frames.pop()),
            n => Err(Error::Stomp(format!("expected one frame, found {}", n))),
        }
    }
}

/// Decode every frame in `text`, skipping heart-beat EOLs between them.
pub fn decode_frames(text: &str) -> Result<Vec<Frame>> {
    let bytes = text.as_bytes();
    let mut frames = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && matches!(bytes[pos], b'\n' | b'\r' | NUL) {
            pos += 1;
        }
        if pos >= bytes.len() {
            return Ok(frames);
        }
        let (frame, next) = decode_one(bytes, pos)?;
        frames.push(frame);
        pos = next;
    }
}

fn decode_one(bytes: &[u8], start: usize) -> Result<(Frame, usize)> {
    let mut pos = start;

    let command = read_line(bytes, &mut pos)?
        .ok_or_else(|| Error::Stomp("frame ends before its command".to_string()))?;
    if command.is_empty() {
        return Err(Error::Stomp("empty command".to_string()));
    }
    let escape = escapes_headers(&command);

    let mut headers: Vec<(String, String)> = Vec::new();
    loop {
        let line = read_line(bytes, &mut pos)?
            .ok_or_else(|| Error::Stomp("frame ends inside its headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Stomp(format!("header without colon: {}", line)))?;
        let (name, value) = if escape {
            (unescape_header(name)?, unescape_header(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        headers.push((name, value));
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| Error::Stomp(format!("bad content-length: {}", v)))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = pos
                .checked_add(len)
                .filter(|end| *end < bytes.len())
                .ok_or_else(|| Error::Stomp(format!("content-length {} exceeds frame", len)))?;
            if bytes[end] != NUL {
                return Err(Error::Stomp(
                    "body does not match content-length".to_string(),
                ));
            }
            end
        }
        None => bytes[pos..]
            .iter()
            .position(|b| *b == NUL)
            .map(|offset| pos + offset)
            .ok_or_else(|| Error::Stomp("frame is not NUL terminated".to_string()))?,
    };

    let body = std::str::from_utf8(&bytes[pos..body_end])
        .map_err(|_| Error::Stomp("body is not valid UTF-8".to_string()))?
        .to_string();

    Ok((
        Frame {
            command,
            headers,
            body,
        },
        body_end + 1,
    ))
}

/// Read one EOL-terminated line (LF or CRLF). `None` if no EOL remains.
fn read_line(bytes: &[u8], pos: &mut usize) -> Result<Option<String>> {
    let rest = &bytes[*pos..];
    let Some(newline) = rest.iter().position(|b| *b == b'\n') else {
        return Ok(None);
    };
    let mut line = &rest[..newline];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    *pos += newline + 1;
    std::str::from_utf8(line)
        .map(|s| Some(s.to_string()))
        .map_err(|_| Error::Stomp("header line is not valid UTF-8".to_string()))
}

/// CONNECT and CONNECTED frames carry their headers verbatim.
fn escapes_headers(command: &str) -> bool {
    command != CONNECT && command != CONNECTED
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(Error::Stomp(format!("undefined escape \\{}", other)));
            }
            None => return Err(Error::Stomp("dangling escape".to_string())),
        }
    }
    Ok(out)
}
