//! Wire encoding of outbound frames.

use bytes::{BufMut, Bytes, BytesMut};

use crate::http::chunk::CompositeBuf;
use crate::http::response::Response;

const CRLF: &[u8] = b"\r\n";
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Everything needed to serialize a response's status line and headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub response: Response,
    /// Protocol version echoed from the request, e.g. "HTTP/1.1".
    pub version: String,
    pub keep_alive: bool,
    pub server_name: Option<String>,
    /// Set for responses to HEAD requests: headers only, no body bytes.
    pub body_suppressed: bool,
}

/// A unit of work for the transport.
#[derive(Debug)]
pub enum Frame {
    /// Status line and headers of a streamed response.
    Head(ResponseHead),
    /// One body chunk of a streamed response.
    Chunk(Bytes),
    /// The final chunk of a streamed response, followed by the terminator.
    /// An empty payload is the bare end-of-body marker.
    Last(Bytes),
    /// Head and complete body in a single write.
    Full { head: ResponseHead, body: CompositeBuf },
}

/// Turns frames into bytes, one response at a time.
///
/// The encoder remembers the framing chosen by the last `Head` so that the
/// following `Chunk`/`Last` frames are encoded to match. While the body is
/// suppressed (HEAD responses) chunk payloads and the terminator encode to
/// nothing.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    chunked: bool,
    body_suppressed: bool,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, frame: Frame) -> CompositeBuf {
        let mut out = CompositeBuf::new();

        match frame {
            Frame::Head(head) => {
                self.chunked = head.response.is_chunked();
                self.body_suppressed = head.body_suppressed;
                out.push(encode_head(&head));
            }
            Frame::Chunk(data) => self.encode_data(data, &mut out),
            Frame::Last(data) => {
                self.encode_data(data, &mut out);
                if self.chunked && !self.body_suppressed {
                    out.push(Bytes::from_static(LAST_CHUNK));
                }
                *self = FrameEncoder::default();
            }
            Frame::Full { head, body } => {
                out.push(encode_head(&head));
                if !head.body_suppressed {
                    out.append(body);
                }
                *self = FrameEncoder::default();
            }
        }

        out
    }

    fn encode_data(&self, data: Bytes, out: &mut CompositeBuf) {
        if self.body_suppressed || data.is_empty() {
            return;
        }

        if self.chunked {
            out.push(Bytes::from(format!("{:x}\r\n", data.len())));
            out.push(data);
            out.push(Bytes::from_static(CRLF));
        } else {
            out.push(data);
        }
    }
}

/// Serializes the status line and headers, terminated by the blank line.
pub fn encode_head(head: &ResponseHead) -> Bytes {
    let mut response = head.response.clone();

    if let Some(name) = &head.server_name {
        if response.header("Server").is_none() {
            response.set_header("Server", name.as_str());
        }
    }

    if !head.keep_alive {
        response.set_header("Connection", "close");
    } else if !head.version.eq_ignore_ascii_case("HTTP/1.1") {
        response.set_header("Connection", "keep-alive");
    }

    let mut buf = BytesMut::with_capacity(256);

    // Status line
    buf.put_slice(
        format!(
            "{} {} {}\r\n",
            head.version,
            response.status.as_u16(),
            response.status.reason_phrase()
        )
        .as_bytes(),
    );

    // Headers
    for (k, v) in &response.headers {
        buf.put_slice(k.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(v.as_bytes());
        buf.put_slice(CRLF);
    }

    // Header/body separator
    buf.put_slice(CRLF);

    buf.freeze()
}
