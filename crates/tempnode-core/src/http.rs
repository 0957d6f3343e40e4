//! Minimal HTTP/1.1 GET client
//!
//! Sends one request over an already connected stream and returns the status
//! code. The response headers and body are never read, so the connection
//! is expected to be closed by the caller afterwards.

use embedded_io_async::{Error as _, ErrorKind, Read, Write};
use log::debug;
use thiserror_no_std::Error;

const USER_AGENT: &str = concat!("tempnode/", env!("CARGO_PKG_VERSION"));

/// Longest status line accepted, including the trailing CRLF.
const STATUS_LINE_MAX: usize = 128;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("sending request failed: {0:?}")]
    Write(ErrorKind),
    #[error("reading response failed: {0:?}")]
    Read(ErrorKind),
    #[error("connection closed before a status line was received")]
    ConnectionClosed,
    #[error("malformed status line")]
    MalformedStatusLine,
}

/// Parses `HTTP/1.x <code> <reason>` and returns the code.
pub fn parse_status_line(line: &[u8]) -> Result<u16, HttpError> {
    let rest = line
        .strip_prefix(b"HTTP/1.")
        .ok_or(HttpError::MalformedStatusLine)?;
    let [minor, b' ', a, b, c, tail @ ..] = rest else {
        return Err(HttpError::MalformedStatusLine);
    };
    if !minor.is_ascii_digit() || !matches!(tail.first(), None | Some(b' ' | b'\r' | b'\n')) {
        return Err(HttpError::MalformedStatusLine);
    }

    [*a, *b, *c].iter().try_fold(0u16, |code, digit| {
        if digit.is_ascii_digit() {
            Ok(code * 10 + u16::from(digit - b'0'))
        } else {
            Err(HttpError::MalformedStatusLine)
        }
    })
}

/// Issues `GET <target>` to `host` over `conn` and returns the status code.
pub async fn get<T>(conn: &mut T, host: &str, target: &str) -> Result<u16, HttpError>
where
    T: Read + Write,
{
    let write_err = |e: T::Error| HttpError::Write(e.kind());
    for part in [
        "GET ",
        target,
        " HTTP/1.1\r\nHost: ",
        host,
        "\r\nUser-Agent: ",
        USER_AGENT,
        "\r\nAccept: */*\r\nConnection: close\r\n\r\n",
    ] {
        conn.write_all(part.as_bytes()).await.map_err(write_err)?;
    }
    conn.flush().await.map_err(write_err)?;

    let mut buf = [0u8; STATUS_LINE_MAX];
    let mut len = 0;
    loop {
        if let Some(end) = buf[..len].iter().position(|&b| b == b'\n') {
            debug!("HTTP status line: {:?}", core::str::from_utf8(&buf[..end]));
            return parse_status_line(&buf[..end]);
        }
        if len == buf.len() {
            return Err(HttpError::MalformedStatusLine);
        }

        let n = conn
            .read(&mut buf[len..])
            .await
            .map_err(|e| HttpError::Read(e.kind()))?;
        if n == 0 {
            return Err(HttpError::ConnectionClosed);
        }
        len += n;
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embassy_futures::block_on;
    use embedded_io_async::ErrorType;
    use heapless::Vec;

    use super::*;

    /// In-memory connection: records writes, replays a canned response in
    /// small chunks.
    struct FakeConn<'a> {
        written: Vec<u8, 512>,
        response: &'a [u8],
        chunk: usize,
    }

    impl<'a> FakeConn<'a> {
        fn new(response: &'a [u8]) -> Self {
            Self {
                written: Vec::new(),
                response,
                chunk: 7,
            }
        }
    }

    impl ErrorType for FakeConn<'_> {
        type Error = Infallible;
    }

    impl Read for FakeConn<'_> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
            let n = self.response.len().min(buf.len()).min(self.chunk);
            buf[..n].copy_from_slice(&self.response[..n]);
            self.response = &self.response[n..];
            Ok(n)
        }
    }

    impl Write for FakeConn<'_> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.written.extend_from_slice(buf).unwrap();
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK\r"), Ok(200));
        assert_eq!(parse_status_line(b"HTTP/1.0 404 Not Found"), Ok(404));
        assert_eq!(parse_status_line(b"HTTP/1.1 500"), Ok(500));
    }

    #[test]
    fn test_parse_status_line_rejects_garbage() {
        for line in [
            &b""[..],
            b"HTTP/2 200 OK",
            b"HTTP/1.1 20 OK",
            b"HTTP/1.1 2x0 OK",
            b"HTTP/1.1 2000 OK",
            b"SSH-2.0-OpenSSH",
        ] {
            assert_eq!(parse_status_line(line), Err(HttpError::MalformedStatusLine));
        }
    }

    #[test]
    fn test_get_writes_request_and_reads_status() {
        let mut conn = FakeConn::new(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n42");

        let status = block_on(get(&mut conn, "api.thingspeak.com", "/update?field1=1")).unwrap();

        assert_eq!(status, 200);
        let expected = concat!(
            "GET /update?field1=1 HTTP/1.1\r\n",
            "Host: api.thingspeak.com\r\n",
            "User-Agent: tempnode/",
            env!("CARGO_PKG_VERSION"),
            "\r\n",
            "Accept: */*\r\n",
            "Connection: close\r\n",
            "\r\n"
        );
        assert_eq!(core::str::from_utf8(&conn.written).unwrap(), expected);
    }

    #[test]
    fn test_get_non_success_status_is_returned() {
        let mut conn = FakeConn::new(b"HTTP/1.1 400 Bad Request\r\n\r\n");
        assert_eq!(block_on(get(&mut conn, "h", "/")), Ok(400));
    }

    #[test]
    fn test_get_connection_closed_early() {
        let mut conn = FakeConn::new(b"HTTP/1.1 2");
        assert_eq!(block_on(get(&mut conn, "h", "/")), Err(HttpError::ConnectionClosed));
    }

    #[test]
    fn test_get_status_line_too_long() {
        let response = [b'x'; 300];
        let mut conn = FakeConn::new(&response);
        assert_eq!(
            block_on(get(&mut conn, "h", "/")),
            Err(HttpError::MalformedStatusLine)
        );
    }
}
