// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MCP Transport Codec.
//!
//! Handles the low-level framing of JSON-RPC messages on a backend's stdio.
//! Outgoing messages are newline-delimited JSON (the MCP stdio framing).
//! Incoming messages may be newline-delimited or LSP-style `Content-Length`
//! framed; the decoder detects which per message. Lines on stdout that are
//! not JSON (banners, stray prints) are skipped instead of killing the stream.

use crate::core::constants::limits;
use crate::core::models::{JsonRpcRequest, JsonRpcResponse};
use anyhow::{anyhow, Context, Result};
use bytes::BytesMut;
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

const CONTENT_LENGTH: &[u8] = b"content-length:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Line,
    Body(usize),
}

/// Anything the bridge writes to a backend.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

pub struct McpCodec {
    state: DecodeState,
    /// Bytes at the front of the buffer already scanned for a newline
    next_index: usize,
}

impl McpCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecodeState::Line,
            next_index: 0,
        }
    }

    /// Parse a complete header block and return the body length.
    fn parse_header_block(header: &[u8]) -> Result<usize> {
        let header_str = std::str::from_utf8(header).context("Invalid UTF-8 in headers")?;
        let mut len = None;
        for line in header_str.lines() {
            let lower = line.to_ascii_lowercase();
            if lower.starts_with("content-length:") {
                if let Some(val_str) = line.split(':').nth(1) {
                    len = Some(
                        val_str
                            .trim()
                            .parse::<usize>()
                            .context("Invalid content-length value")?,
                    );
                }
            }
        }
        match len {
            Some(0) | None => Err(anyhow!("Missing or invalid Content-Length header")),
            Some(n) if n as u64 > limits::MAX_MESSAGE_SIZE_BYTES => {
                Err(anyhow!("Message length {} exceeds max limit", n))
            }
            Some(n) => Ok(n),
        }
    }

    /// Offset just past the blank line ending a header block, if present.
    fn find_header_end(src: &[u8]) -> Option<usize> {
        let mut i = 0;
        while i < src.len() {
            if src[i] == b'\n' {
                if i >= 1 && src[i - 1] == b'\n' {
                    return Some(i + 1);
                }
                if i >= 3 && src[i - 1] == b'\r' && src[i - 2] == b'\n' && src[i - 3] == b'\r' {
                    return Some(i + 1);
                }
            }
            i += 1;
        }
        None
    }

    fn starts_with_header(src: &[u8]) -> bool {
        src.len() >= CONTENT_LENGTH.len()
            && src[..CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH)
    }

    fn encode_json<T: Serialize>(item: &T, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}

impl Default for McpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for McpCodec {
    type Item = Value;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        trace!("Decoder attempting to read from {} bytes buffer", src.len());
        loop {
            match self.state {
                DecodeState::Body(len) => {
                    if src.len() < len {
                        return Ok(None);
                    }
                    let body = src.split_to(len);
                    self.state = DecodeState::Line;
                    let val: Value = serde_json::from_slice(&body)
                        .context("Invalid JSON in Content-Length framed body")?;
                    return Ok(Some(val));
                }
                DecodeState::Line => {
                    // Drop blank lines and separators between messages
                    let skip = src
                        .iter()
                        .take_while(|b| b.is_ascii_whitespace())
                        .count();
                    let _ = src.split_to(skip);
                    self.next_index = self.next_index.saturating_sub(skip);
                    if src.is_empty() {
                        return Ok(None);
                    }

                    if Self::starts_with_header(src) {
                        match Self::find_header_end(src) {
                            Some(end) => {
                                let header = src.split_to(end);
                                self.next_index = 0;
                                self.state = DecodeState::Body(Self::parse_header_block(&header)?);
                                continue;
                            }
                            None if src.len() > limits::MAX_HEADER_BYTES => {
                                return Err(anyhow!("Header too large"));
                            }
                            None => return Ok(None),
                        }
                    }

                    let scan_from = self.next_index.min(src.len());
                    let Some(offset) = src[scan_from..].iter().position(|b| *b == b'\n') else {
                        self.next_index = src.len();
                        if src.len() as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
                            return Err(anyhow!(
                                "Message exceeded size limit of {} bytes",
                                limits::MAX_MESSAGE_SIZE_BYTES
                            ));
                        }
                        return Ok(None);
                    };

                    let line = src.split_to(scan_from + offset + 1);
                    self.next_index = 0;
                    match serde_json::from_slice::<Value>(&line) {
                        Ok(val) => {
                            trace!("Decoded message: {:?}", val);
                            return Ok(Some(val));
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                line = %String::from_utf8_lossy(&line).trim(),
                                "Skipping non-JSON line on backend stdout"
                            );
                        }
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(val) = self.decode(src)? {
            return Ok(Some(val));
        }
        self.next_index = 0;
        if self.state != DecodeState::Line || src.iter().all(|b| b.is_ascii_whitespace()) {
            src.clear();
            return Ok(None);
        }
        // Final message without a trailing newline
        let rest = src.split();
        match serde_json::from_slice::<Value>(&rest) {
            Ok(val) => Ok(Some(val)),
            Err(e) => {
                warn!(error = %e, "Discarding trailing partial message at EOF");
                Ok(None)
            }
        }
    }
}

impl Encoder<Outbound> for McpCodec {
    type Error = anyhow::Error;
    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<()> {
        Self::encode_json(&item, dst)
    }
}

impl<'a> Encoder<&'a JsonRpcRequest> for McpCodec {
    type Error = anyhow::Error;
    fn encode(&mut self, item: &'a JsonRpcRequest, dst: &mut BytesMut) -> Result<()> {
        Self::encode_json(item, dst)
    }
}

impl<'a> Encoder<&'a JsonRpcResponse> for McpCodec {
    type Error = anyhow::Error;
    fn encode(&mut self, item: &'a JsonRpcResponse, dst: &mut BytesMut) -> Result<()> {
        Self::encode_json(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(input: &[u8]) -> Vec<Value> {
        let mut codec = McpCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(v) = codec.decode(&mut buf).unwrap() {
            out.push(v);
        }
        if let Some(v) = codec.decode_eof(&mut buf).unwrap() {
            out.push(v);
        }
        out
    }

    #[test]
    fn test_newline_delimited() {
        let msgs = decode_all(b"{\"id\":1}\n\n{\"id\":2}\r\n");
        assert_eq!(msgs, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_content_length_framing() {
        let body = br#"{"jsonrpc":"2.0","id":7,"result":{}}"#;
        let mut input = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        input.extend_from_slice(body);
        input.extend_from_slice(b"{\"id\":8}\n");

        let msgs = decode_all(&input);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["id"], 7);
        assert_eq!(msgs[1]["id"], 8);
    }

    #[test]
    fn test_partial_line_waits_for_more() {
        let mut codec = McpCodec::new();
        let mut buf = BytesMut::from(&b"{\"id\":"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"3}\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"id": 3})));
    }

    #[test]
    fn test_chunked_line_is_scanned_once() {
        let payload = format!("{{\"id\":9,\"blob\":\"{}\"}}\n", "a".repeat(64 * 1024));
        let bytes = payload.as_bytes();
        let (body, last) = bytes.split_at(bytes.len() - 1);

        let mut codec = McpCodec::new();
        let mut buf = BytesMut::new();
        for chunk in body.chunks(1024) {
            buf.extend_from_slice(chunk);
            assert!(codec.decode(&mut buf).unwrap().is_none());
            assert_eq!(codec.next_index, buf.len());
        }

        buf.extend_from_slice(last);
        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(value["id"], 9);
        assert!(buf.is_empty());
        assert_eq!(codec.next_index, 0);
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let msgs = decode_all(b"server starting on stdio...\n{\"id\":1}\n");
        assert_eq!(msgs, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_trailing_message_without_newline() {
        let msgs = decode_all(b"{\"id\":1}\n{\"id\":2}");
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn test_missing_content_length_value_is_error() {
        let mut codec = McpCodec::new();
        let mut buf = BytesMut::from(&b"Content-Length: \r\n\r\n{}"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_is_newline_terminated() {
        let mut codec = McpCodec::new();
        let mut dst = BytesMut::new();
        let req = JsonRpcRequest::new(1, "tools/list", None);
        codec.encode(&req, &mut dst).unwrap();
        assert_eq!(dst.last(), Some(&b'\n'));
        assert_eq!(dst.iter().filter(|b| **b == b'\n').count(), 1);

        let back: Value = serde_json::from_slice(&dst[..dst.len() - 1]).unwrap();
        assert_eq!(back["method"], "tools/list");
        assert!(back.get("params").is_none());
    }
}
