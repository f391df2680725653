//! Wire-level serialization of an HTTP response for caching.
//!
//! The coalescing cache stores full response bytes, not a parsed object,
//! so that replaying a cache hit produces an independent `UpstreamResponse`
//! every time rather than handing out shared, mutable state. The format is
//! a literal HTTP/1.1 response: a status line, header lines, a blank line,
//! then the body — so a cache dump can be inspected with any HTTP parser,
//! not just this one.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Malformed,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed cached HTTP response")
    }
}

impl std::error::Error for WireError {}

impl WireResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.body.len() + 128);
        buf.extend_from_slice(format!("HTTP/1.1 {}\r\n", self.status).as_bytes());
        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let sep = find_header_terminator(bytes).ok_or(WireError::Malformed)?;
        let head = std::str::from_utf8(&bytes[..sep]).map_err(|_| WireError::Malformed)?;
        let body = bytes[sep + 4..].to_vec();

        let mut lines = head.split("\r\n");
        let status_line = lines.next().ok_or(WireError::Malformed)?;
        let status = parse_status(status_line)?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line.split_once(": ").ok_or(WireError::Malformed)?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

fn find_header_terminator(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_status(status_line: &str) -> Result<u16, WireError> {
    let code = status_line
        .strip_prefix("HTTP/1.1 ")
        .ok_or(WireError::Malformed)?;
    code.parse().map_err(|_| WireError::Malformed)
}
