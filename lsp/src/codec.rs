//! `Content-Length` framing for JSON-RPC over a language server's stdio.
//!
//! Each message is `Content-Length: N\r\n` (plus optional headers), a blank
//! line, then exactly `N` bytes of JSON.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single message body. Symbol responses for large
/// workspaces are the biggest payloads we expect.
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Next message, or `Ok(None)` when the stream ends between messages.
    pub async fn read_frame(&mut self) -> Result<Option<Value>> {
        let Some(len) = self.read_content_length().await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_BYTES {
            bail!("frame of {len} bytes exceeds limit of {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; len];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        let value = serde_json::from_slice(&body).context("decoding frame body as JSON")?;
        Ok(Some(value))
    }

    async fn read_content_length(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("reading frame header")?;
            if n == 0 {
                if started {
                    bail!("stream ended inside frame headers");
                }
                return Ok(None);
            }
            started = true;

            let header = self.line.trim();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                let len = value
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("bad Content-Length: {}", value.trim()))?;
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .context("frame headers without Content-Length")
    }
}

pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame(&mut self, msg: &Value) -> Result<()> {
        let body = serde_json::to_vec(msg).context("encoding frame body")?;
        let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
        frame.extend_from_slice(&body);

        self.writer
            .write_all(&frame)
            .await
            .context("writing frame")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn encode(msgs: &[Value]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        for msg in msgs {
            writer.write_frame(msg).await.unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn reads_back_consecutive_frames() {
        let first = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": []});
        let second = serde_json::json!({"jsonrpc": "2.0", "method": "initialized"});
        let buf = encode(&[first.clone(), second.clone()]).await;

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap(), Some(first));
        assert_eq!(reader.read_frame().await.unwrap(), Some(second));
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn content_length_counts_bytes_not_chars() {
        let msg = serde_json::json!({"name": "naïve"});
        let buf = encode(std::slice::from_ref(&msg)).await;
        let body_len = serde_json::to_vec(&msg).unwrap().len();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with(&format!("Content-Length: {body_len}\r\n\r\n")));

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap(), Some(msg));
    }

    #[tokio::test]
    async fn accepts_lowercase_header_and_extra_headers() {
        let body = r#"{"id":7}"#;
        let frame = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        let mut reader = FrameReader::new(frame.as_bytes());
        assert_eq!(reader.read_frame().await.unwrap().unwrap()["id"], 7);
    }

    #[tokio::test]
    async fn malformed_frames_are_errors() {
        let cases: [&[u8]; 5] = [
            b"Content-Type: application/json\r\n\r\n{}",
            b"Content-Length: 10\r\n",
            b"Content-Length: abc\r\n\r\n",
            b"Content-Length: 50\r\n\r\n{}",
            b"Content-Length: 3\r\n\r\nxyz",
        ];
        for case in cases {
            let mut reader = FrameReader::new(case);
            assert!(
                reader.read_frame().await.is_err(),
                "{:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_reading_body() {
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut reader = FrameReader::new(header.as_bytes());
        assert!(reader.read_frame().await.is_err());
    }
}
