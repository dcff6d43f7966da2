//! Destination leg of a relay: one streaming `PUT` over a dedicated
//! HTTP/1.1 connection.
//!
//! The request runs on `hyper::client::conn`, so the response head is read
//! independently of the request body. Resumable endpoints commonly reject an
//! upload (expired session, quota) without reading it and then hang up while
//! the body is still being written. [`UploadStream`] absorbs that write
//! failure, so the status the destination already sent is what gets reported.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderValue, USER_AGENT};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use url::{Host, Position, Url};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// One chunk of the upload body; an `Err` aborts the request.
pub(crate) type UploadChunk = Result<Bytes, io::Error>;

/// Streaming request body fed from the source pump.
pub(crate) type UploadBody = UnsyncBoxBody<Bytes, io::Error>;

/// Wrap the pump's receiving end into a request body.
pub(crate) fn upload_body(rx: mpsc::Receiver<UploadChunk>) -> UploadBody {
    StreamBody::new(ReceiverStream::new(rx).map(|chunk| chunk.map(Frame::data))).boxed_unsync()
}

trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

/// Opens destination connections and sends the upload request.
#[derive(Clone)]
pub(crate) struct DestinationConnector {
    tls: TlsConnector,
    connect_timeout: Duration,
    user_agent: HeaderValue,
}

impl fmt::Debug for DestinationConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConnector")
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl DestinationConnector {
    pub(crate) fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| RelayError::setup(format!("TLS configuration: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| RelayError::setup(format!("invalid user agent: {e}")))?;

        Ok(Self {
            tls: TlsConnector::from(Arc::new(tls_config)),
            connect_timeout: config.connect_timeout,
            user_agent,
        })
    }

    /// Send the `PUT` and wait for the response head.
    ///
    /// The connection keeps streaming `body` in the background until it is
    /// exhausted or the peer goes away.
    pub(crate) async fn send(
        &self,
        destination: &Url,
        content_type: &str,
        content_length: Option<u64>,
        body: UploadBody,
    ) -> Result<Response<Incoming>, RelayError> {
        let request = build_request(
            destination,
            &self.user_agent,
            content_type,
            content_length,
            body,
        )?;
        let io = self.connect(destination).await?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io))
            .await
            .map_err(RelayError::destination_transport)?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "Destination connection ended with error");
            }
        });

        sender
            .send_request(request)
            .await
            .map_err(RelayError::destination_transport)
    }

    async fn connect(&self, url: &Url) -> Result<UploadStream, RelayError> {
        let host = match url.host() {
            Some(Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => return Err(RelayError::destination_transport("destination URL has no host")),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| RelayError::destination_transport("destination URL has no port"))?;

        let connecting = TcpStream::connect((host.as_str(), port));
        let tcp = if self.connect_timeout.is_zero() {
            connecting.await
        } else {
            tokio::time::timeout(self.connect_timeout, connecting)
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
                })
        }
        .map_err(RelayError::destination_transport)?;

        if let Err(e) = tcp.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY on destination connection");
        }

        let stream: Box<dyn Io> = if url.scheme() == "https" {
            let server_name =
                ServerName::try_from(host).map_err(RelayError::destination_transport)?;
            let tls = self
                .tls
                .connect(server_name, tcp)
                .await
                .map_err(RelayError::destination_transport)?;
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        debug!(host = %url.host_str().unwrap_or_default(), port, "Destination connected");
        Ok(UploadStream::new(stream))
    }
}

fn build_request(
    destination: &Url,
    user_agent: &HeaderValue,
    content_type: &str,
    content_length: Option<u64>,
    body: UploadBody,
) -> Result<Request<UploadBody>, RelayError> {
    let target = &destination[Position::BeforePath..Position::AfterQuery];
    let authority = &destination[Position::BeforeHost..Position::AfterPort];

    let mut builder = Request::put(target)
        .header(HOST, authority)
        .header(USER_AGENT, user_agent.clone())
        .header(CONTENT_TYPE, content_type);
    if let Some(length) = content_length {
        builder = builder.header(CONTENT_LENGTH, length);
    }

    builder
        .body(body)
        .map_err(|e| RelayError::setup(format!("invalid upload request: {e}")))
}

/// Connection wrapper that keeps the read half usable after the peer stops
/// accepting the request body.
///
/// After the first failed write the rest of the body is discarded, and the
/// HTTP client goes on to read whatever response the peer already sent. A
/// peer that hung up without answering still surfaces as a read error.
struct UploadStream {
    inner: Box<dyn Io>,
    write_failed: bool,
}

impl UploadStream {
    fn new(inner: Box<dyn Io>) -> Self {
        Self {
            inner,
            write_failed: false,
        }
    }

    fn absorb(&mut self, error: io::Error) {
        debug!(error = %error, "Destination stopped reading the upload body");
        self.write_failed = true;
    }
}

impl AsyncRead for UploadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for UploadStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_failed {
            return Poll::Ready(Ok(buf.len()));
        }
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Err(e)) => {
                this.absorb(e);
                Poll::Ready(Ok(buf.len()))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.write_failed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(Err(e)) => {
                this.absorb(e);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.write_failed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut this.inner).poll_shutdown(cx) {
            Poll::Ready(Err(e)) => {
                this.absorb(e);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn empty_body() -> UploadBody {
        let (_tx, rx) = mpsc::channel(1);
        upload_body(rx)
    }

    #[test]
    fn request_targets_path_and_authority() {
        let url = Url::parse("https://upload.example:8443/upload/v1?upload_id=xyz#frag").unwrap();
        let user_agent = HeaderValue::from_static("relay-engine/test");

        let request =
            build_request(&url, &user_agent, "video/mp4", Some(42), empty_body()).unwrap();

        assert_eq!(request.method(), hyper::Method::PUT);
        assert_eq!(request.uri(), "/upload/v1?upload_id=xyz");
        assert_eq!(request.headers()[HOST], "upload.example:8443");
        assert_eq!(request.headers()[CONTENT_TYPE], "video/mp4");
        assert_eq!(request.headers()[CONTENT_LENGTH], "42");
    }

    #[test]
    fn default_port_is_left_out_of_host() {
        let url = Url::parse("https://upload.example/session").unwrap();
        let user_agent = HeaderValue::from_static("relay-engine/test");

        let request = build_request(&url, &user_agent, "video/mp4", None, empty_body()).unwrap();

        assert_eq!(request.headers()[HOST], "upload.example");
        assert!(request.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn invalid_content_type_is_a_setup_error() {
        let url = Url::parse("http://upload.example/s").unwrap();
        let user_agent = HeaderValue::from_static("relay-engine/test");

        let err = build_request(&url, &user_agent, "video/\nmp4", None, empty_body()).unwrap_err();
        assert!(matches!(err, RelayError::Setup { .. }));
    }

    #[tokio::test]
    async fn writes_after_peer_hangup_are_discarded_but_reads_continue() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = UploadStream::new(Box::new(client));

        server.write_all(b"HTTP/1.1 403 Forbidden\r\n").await.unwrap();
        drop(server);

        // The peer is gone, yet writes keep succeeding.
        stream.write_all(&[0u8; 1024]).await.unwrap();
        stream.flush().await.unwrap();
        assert!(stream.write_failed);

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "HTTP/1.1 403 Forbidden\r\n");
    }
}
