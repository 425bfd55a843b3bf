//! Loopback listener for the OAuth authorization callback.
//!
//! After [`AuthFlow::initiate`](gatelink_core::AuthFlow::initiate) the
//! browser lands on the configured redirect URI. This listener accepts
//! that single request, hands the raw query string back to the caller for
//! validation by the auth flow, and shows the user a minimal result page.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;

/// Listen on the given port for the OAuth callback and return its raw
/// query string.
///
/// The listener handles exactly one callback request; stray requests
/// without a query (such as favicon fetches) are answered with 404 and
/// skipped.
pub async fn listen_for_callback(port: u16) -> Result<String> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind callback listener on {addr}"))?;

    info!("listening for OAuth callback on {addr}");

    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .context("failed to accept callback connection")?;

        let mut buffer = [0; 4096];
        let n = socket
            .read(&mut buffer)
            .await
            .context("failed to read callback request")?;

        let request = String::from_utf8_lossy(&buffer[..n]);

        let Some(query) = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|path| path.split_once('?'))
            .map(|(_, query)| query.to_string())
        else {
            let response = b"HTTP/1.1 404 Not Found\r\n\r\n";
            let _ = socket.write_all(response).await;
            continue;
        };

        let page: &[u8] = if query.contains("error=") {
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
                <html><body><h1>Authentication Failed</h1>\
                <p>The authorization server returned an error. \
                You can close this window.</p></body></html>"
        } else {
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
                <html><body><h1>Authentication Complete</h1>\
                <p>You can close this window and return to the terminal.</p></body></html>"
        };
        let _ = socket.write_all(page).await;

        return Ok(query);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn request(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn returns_the_raw_callback_query() {
        // Bind on an ephemeral port by probing: ask the OS for a free port.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let listener = tokio::spawn(listen_for_callback(port));

        // Give the listener a moment to bind.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let response = request(port, "/callback?code=abc123&state=xyz").await;
        assert!(response.contains("200 OK"));
        assert!(response.contains("Authentication Complete"));

        let query = listener.await.unwrap().unwrap();
        assert_eq!(query, "code=abc123&state=xyz");
    }

    #[tokio::test]
    async fn skips_requests_without_a_query() {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let listener = tokio::spawn(listen_for_callback(port));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stray = request(port, "/favicon.ico").await;
        assert!(stray.contains("404"));

        let response = request(port, "/callback?error=access_denied").await;
        assert!(response.contains("Authentication Failed"));

        let query = listener.await.unwrap().unwrap();
        assert_eq!(query, "error=access_denied");
    }
}
