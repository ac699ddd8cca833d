//! HTTP client side of `push` and `pull`

use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::MAX_PAYLOAD_SIZE;

/// Guess a `Content-Type` for a payload from its leading bytes
pub fn detect_content_type(data: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(data) {
        return format.to_mime_type();
    }

    if std::str::from_utf8(data).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

/// Read `input` to the end and POST it to the hub at `url`.
///
/// Returns the number of bytes sent.
pub async fn push<R: AsyncRead + Unpin>(url: &str, mut input: R) -> Result<usize> {
    let mut body = Vec::new();
    input
        .read_to_end(&mut body)
        .await
        .context("Failed to read input")?;
    if body.len() > MAX_PAYLOAD_SIZE {
        bail!(
            "input is {} bytes, the hub accepts at most {}",
            body.len(),
            MAX_PAYLOAD_SIZE
        );
    }

    let content_type = detect_content_type(&body);
    debug!("Pushing {} bytes as {}", body.len(), content_type);

    let len = body.len();
    let response = reqwest::Client::new()
        .post(url)
        .header(CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await
        .context("Failed to connect to server")?;

    if response.status() != StatusCode::OK {
        bail!("server returned error: {}", response.status());
    }

    Ok(len)
}

/// GET the hub's clipboard from `url` and write it to `output`.
///
/// An empty clipboard writes nothing. Returns the number of bytes written.
pub async fn pull<W: AsyncWrite + Unpin>(url: &str, mut output: W) -> Result<usize> {
    let response = reqwest::get(url)
        .await
        .context("Failed to connect to server")?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::NO_CONTENT => {
            debug!("Hub clipboard is empty");
            return Ok(0);
        }
        status => bail!("server returned error: {}", status),
    }

    let body = response
        .bytes()
        .await
        .context("Failed to read response")?;
    output.write_all(&body).await?;
    output.flush().await?;

    Ok(body.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", "image/png")]
    #[case(b"\xff\xd8\xff\xe0\0\x10JFIF", "image/jpeg")]
    #[case(b"GIF89a", "image/gif")]
    #[case(b"plain words", "text/plain; charset=utf-8")]
    #[case(b"", "text/plain; charset=utf-8")]
    #[case(b"\xff\xfe\xfd", "application/octet-stream")]
    fn test_detect_content_type(#[case] data: &[u8], #[case] expected: &str) {
        assert_eq!(detect_content_type(data), expected);
    }

    #[tokio::test]
    async fn test_push_to_unreachable_hub_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = push(&format!("http://{}", addr), &b"hi"[..]).await;
        assert!(result.is_err());
    }
}
