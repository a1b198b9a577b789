//! Ynison session client.
//!
//! Looks up the state of the user's listening session. Each lookup takes
//! two short-lived websocket connections, which are opened and closed
//! within the call:
//!
//! ```text
//! redirector                          session host
//!     |  <- connect (descriptor)           |
//!     |  -> {host, redirect_ticket}        |
//!     x                                    |  <- connect (descriptor + ticket)
//!                                          |  <- PutYnisonState (empty queue)
//!                                          |  -> session state
//!                                          x
//! ```
//!
//! Every connection authenticates with the OAuth token and describes this
//! process as a shadow web player in the negotiation headers. The client
//! never changes what is playing: its own queue is always empty and paused.
//!
//! # Versions
//!
//! State updates carry version numbers and the service ignores updates
//! older than what it has seen. The client starts from a random version,
//! counts up for every update, and jumps ahead to the highest version it
//! has seen in a session state.

use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderValue, AUTHORIZATION, ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, handshake::client::Request, Message},
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    playback::PlayerState,
    protocol::{
        self,
        ynison::{Descriptor, Device, Document, PutState, Redirect, Version},
    },
    token::Token,
};

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for the Ynison redirector and state service.
pub struct Client {
    token: Token,
    device: Device,
    redirect_url: Url,
    snapshot_file: Option<PathBuf>,
    version: AtomicU64,
}

impl Client {
    /// `Origin` of the web player.
    const ORIGIN: &'static str = "http://music.yandex.ru";

    /// Path of the state service on the session host.
    const STATE_PATH: &'static str = "/ynison_state.YnisonStateService/PutYnisonState";

    /// Time allowed for connecting, and for receiving the reply.
    const TIMEOUT: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            token: config.token.clone(),
            device: config.device.clone(),
            redirect_url: config.redirect_url.clone(),
            snapshot_file: config.snapshot_file.clone(),
            // Stay clear of the top so that counting up cannot overflow.
            version: AtomicU64::new(fastrand::u64(..u64::MAX / 2)),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Resolves the host that serves the user's session.
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` if the token is rejected during negotiation
    /// * `InvalidArgument` if the reply lacks a host or ticket
    /// * a connection error if the redirector cannot be reached
    pub async fn redirect(&self) -> Result<Redirect> {
        let request = self.request(self.redirect_url.as_str(), self.device.descriptor())?;
        let reply = Self::exchange(request, None).await?;

        let redirect: Redirect = protocol::json(&reply, "GetRedirectToYnison")?;
        if redirect.host.is_empty() || redirect.redirect_ticket.is_empty() {
            return Err(Error::invalid_argument("redirect without host or ticket"));
        }

        debug!("session served by {}", redirect.host);
        Ok(redirect)
    }

    /// Queries the state of the session served by `redirect.host`.
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` if the token or ticket is rejected
    /// * `InvalidArgument` if the reply is not a session state
    /// * a connection error if the host cannot be reached
    pub async fn query(&self, redirect: &Redirect) -> Result<Document> {
        let url = self.state_url(&redirect.host)?;
        let descriptor = self
            .device
            .descriptor()
            .with_ticket(&redirect.redirect_ticket);
        let request = self.request(url.as_str(), descriptor)?;

        let payload = PutState::query(&self.device, self.next_version(), self.next_version());
        let reply = Self::exchange(request, Some(serde_json::to_string(&payload)?)).await?;

        let document: Document = protocol::json(&reply, "PutYnisonState")?;
        self.snapshot(&reply);

        let seen = document.highest_version();
        let previous = self.version.fetch_max(seen, Ordering::Relaxed);
        if seen > previous {
            trace!("version advanced from {previous} to {seen}");
        }

        Ok(document)
    }

    /// Looks up the player state of the user's session.
    ///
    /// # Errors
    ///
    /// As [`Client::redirect`] and [`Client::query`].
    pub async fn player_state(&self) -> Result<PlayerState> {
        let redirect = self.redirect().await?;
        let document = self.query(&redirect).await?;
        Ok(document.player_state())
    }

    /// Takes the next version. The counter saturates instead of wrapping, so
    /// it never goes back even after the session reports `u64::MAX`.
    fn next_version(&self) -> Version {
        let version = self
            .version
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |version| {
                Some(version.saturating_add(1))
            })
            .unwrap_or_else(|version| version);

        Version {
            device_id: self.device.id.clone(),
            version,
            timestamp_ms: 0,
        }
    }

    /// URL of the state service on `host`, with the scheme of the
    /// redirector.
    fn state_url(&self, host: &str) -> Result<Url> {
        let url = Url::parse(&format!(
            "{}://{host}{}",
            self.redirect_url.scheme(),
            Self::STATE_PATH
        ))?;

        if url.host_str().is_none() || url.path() != Self::STATE_PATH {
            return Err(Error::invalid_argument(format!("invalid session host {host:?}")));
        }

        Ok(url)
    }

    /// Builds a websocket request with the negotiation headers.
    fn request(&self, url: &str, descriptor: Descriptor<'_>) -> Result<Request> {
        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();

        let mut authorization = HeaderValue::from_str(&format!("OAuth {}", self.token))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        headers.insert(ORIGIN, HeaderValue::from_static(Self::ORIGIN));

        let mut protocol = HeaderValue::from_str(&descriptor.protocol_header()?)?;
        protocol.set_sensitive(descriptor.redirect_ticket.is_some());
        headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        Ok(request)
    }

    /// Connects, optionally sends `outbound`, and returns the first message
    /// received.
    async fn exchange(request: Request, outbound: Option<String>) -> Result<String> {
        let uri = request.uri().clone();
        let (mut stream, response) =
            timeout(Self::TIMEOUT, tokio_tungstenite::connect_async(request)).await??;
        trace!("connected to {uri}: {}", response.status());

        let result: Result<String> = async {
            if let Some(text) = outbound {
                stream.send(Message::text(text)).await?;
            }
            timeout(Self::TIMEOUT, Self::receive(&mut stream)).await?
        }
        .await;

        if let Err(e) = stream.close(None).await {
            trace!("closing {uri}: {e}");
        }

        result
    }

    /// Reads the next data message.
    ///
    /// Control frames are skipped; tungstenite answers pings by itself.
    async fn receive(stream: &mut WebSocket) -> Result<String> {
        while let Some(message) = stream.next().await {
            match message? {
                Message::Text(text) => return Ok(text.as_str().to_owned()),
                Message::Binary(data) => {
                    return String::from_utf8(data.to_vec()).map_err(|e| {
                        Error::invalid_argument(format!("binary message is not UTF-8: {e}"))
                    })
                }
                Message::Close(frame) => {
                    return Err(Error::cancelled(format!(
                        "connection closed before reply: {frame:?}"
                    )))
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        Err(Error::cancelled("connection ended before reply"))
    }

    /// Dumps the raw session state for diagnostics.
    fn snapshot(&self, reply: &str) {
        let Some(path) = &self.snapshot_file else {
            return;
        };

        let contents = serde_json::from_str::<serde_json::Value>(reply)
            .and_then(|value| serde_json::to_string_pretty(&value))
            .unwrap_or_else(|_| reply.to_owned());

        if let Err(e) = fs::write(path, contents) {
            warn!("could not write snapshot to {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use http::{HeaderMap, StatusCode};
    use tokio::{net::TcpListener, task::JoinHandle};
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as ServerRequest, Response as ServerResponse,
    };

    use super::*;
    use crate::error::ErrorKind;

    /// What a mock server saw of its single connection.
    #[derive(Debug, Default)]
    struct Seen {
        headers: HeaderMap,
        path: String,
        message: Option<String>,
    }

    enum Behavior {
        /// Send `reply` right away, like the redirector.
        Push(String),
        /// Wait for one message, then send `reply`, like the state service.
        Answer(String),
        /// Refuse the handshake with this status.
        Reject(StatusCode),
    }

    async fn mock(behavior: Behavior) -> (SocketAddr, JoinHandle<Seen>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let seen = Arc::new(Mutex::new(Seen::default()));

            let reject = match &behavior {
                Behavior::Reject(status) => Some(*status),
                _ => None,
            };
            let recorder = Arc::clone(&seen);
            let callback = move |request: &ServerRequest, mut response: ServerResponse| {
                {
                    let mut seen = recorder.lock().unwrap();
                    seen.headers = request.headers().clone();
                    seen.path = request.uri().path().to_owned();
                }

                if let Some(status) = reject {
                    let mut error = ErrorResponse::new(Some("rejected".to_owned()));
                    *error.status_mut() = status;
                    return Err(error);
                }

                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("Bearer"));
                Ok(response)
            };

            if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                match behavior {
                    Behavior::Push(reply) => {
                        ws.send(Message::text(reply)).await.unwrap();
                    }
                    Behavior::Answer(reply) => {
                        if let Some(Ok(Message::Text(text))) = ws.next().await {
                            seen.lock().unwrap().message = Some(text.as_str().to_owned());
                        }
                        ws.send(Message::text(reply)).await.unwrap();
                    }
                    Behavior::Reject(_) => unreachable!(),
                }
                // Drain until the client closes.
                while let Some(Ok(_)) = ws.next().await {}
            }

            let mut seen = seen.lock().unwrap();
            std::mem::take(&mut *seen)
        });

        (addr, handle)
    }

    fn client(redirector: SocketAddr, snapshot_file: Option<PathBuf>) -> Client {
        let mut config = Config::with_token("y0_test".parse().unwrap());
        config.redirect_url = Url::parse(&format!(
            "ws://{redirector}/redirector.YnisonRedirectService/GetRedirectToYnison"
        ))
        .unwrap();
        config.snapshot_file = snapshot_file;
        Client::new(&config)
    }

    const SESSION: &str = r#"{"player_state": {
        "player_queue": {
            "current_playable_index": 0,
            "playable_list": [{"playable_id": "9982", "playable_type": "TRACK"}],
            "version": {"device_id": "phone", "version": "18446744073709551000", "timestamp_ms": 0}
        },
        "status": {"paused": false, "progress_ms": 65000, "duration_ms": 185000}
    }}"#;

    #[tokio::test]
    async fn redirect_sends_negotiation_headers() {
        let (addr, server) = mock(Behavior::Push(
            r#"{"host": "ynison-1.music.yandex.ru", "redirect_ticket": "T1", "session_id": "5"}"#
                .to_owned(),
        ))
        .await;
        let client = client(addr, None);

        let redirect = client.redirect().await.unwrap();
        assert_eq!(redirect.host, "ynison-1.music.yandex.ru");
        assert_eq!(redirect.redirect_ticket, "T1");

        let seen = server.await.unwrap();
        assert_eq!(seen.path, "/redirector.YnisonRedirectService/GetRedirectToYnison");
        assert_eq!(seen.headers[AUTHORIZATION], "OAuth y0_test");
        assert_eq!(seen.headers[ORIGIN], "http://music.yandex.ru");
        let protocol = seen.headers[SEC_WEBSOCKET_PROTOCOL].to_str().unwrap();
        assert!(protocol.starts_with("Bearer, v2, {\"Ynison-Device-Id\":\""));
        assert!(protocol.contains(&client.device().id));
        assert!(!protocol.contains("Ynison-Redirect-Ticket"));
    }

    #[tokio::test]
    async fn redirect_without_ticket_is_protocol_error() {
        let (addr, _server) = mock(Behavior::Push(r#"{"host": "h"}"#.to_owned())).await;
        let error = client(addr, None).redirect().await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn rejected_token_is_unauthenticated() {
        let (addr, _server) = mock(Behavior::Reject(StatusCode::UNAUTHORIZED)).await;
        let error = client(addr, None).redirect().await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn unreachable_redirector_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = client(addr, None).redirect().await.unwrap_err();
        assert!(error.is_connection(), "{error}");
    }

    #[tokio::test]
    async fn player_state_follows_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("ynison_data.json");

        let (state_addr, state_server) = mock(Behavior::Answer(SESSION.to_owned())).await;
        let (redirect_addr, _redirect_server) = mock(Behavior::Push(format!(
            r#"{{"host": "{state_addr}", "redirect_ticket": "T1"}}"#
        )))
        .await;
        let client = client(redirect_addr, Some(snapshot.clone()));

        let state = client.player_state().await.unwrap();
        assert!(state.is_playing);
        assert_eq!(state.track_id.as_deref(), Some("9982"));
        assert_eq!(state.progress_ms, 65_000);

        let seen = state_server.await.unwrap();
        assert_eq!(seen.path, Client::STATE_PATH);
        assert!(seen.headers[SEC_WEBSOCKET_PROTOCOL]
            .to_str()
            .unwrap()
            .contains(r#""Ynison-Redirect-Ticket":"T1""#));

        let query: serde_json::Value = serde_json::from_str(&seen.message.unwrap()).unwrap();
        let queue = &query["update_full_state"]["player_state"]["player_queue"];
        assert_eq!(queue["current_playable_index"], -1);
        assert_eq!(queue["playable_list"], serde_json::json!([]));

        // The counter jumps past the version seen in the session.
        assert!(client.next_version().version >= 18_446_744_073_709_551_000);

        let dumped: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(snapshot).unwrap()).unwrap();
        assert_eq!(
            dumped["player_state"]["player_queue"]["playable_list"][0]["playable_id"],
            "9982"
        );
    }

    #[test]
    fn versions_never_go_back() {
        let client = client("127.0.0.1:1".parse().unwrap(), None);
        let first = client.next_version().version;
        let second = client.next_version().version;
        assert!(second > first);
    }

    #[test]
    fn versions_saturate_at_the_top() {
        let client = client("127.0.0.1:1".parse().unwrap(), None);
        client.version.fetch_max(u64::MAX - 1, Ordering::Relaxed);

        let versions: Vec<u64> = (0..4).map(|_| client.next_version().version).collect();
        assert_eq!(versions, [u64::MAX - 1, u64::MAX, u64::MAX, u64::MAX]);
    }

    #[test]
    fn state_url_rejects_paths_in_host() {
        let client = client("127.0.0.1:1".parse().unwrap(), None);
        assert_eq!(
            client.state_url("ynison-1.music.yandex.ru").unwrap().as_str(),
            "ws://ynison-1.music.yandex.ru/ynison_state.YnisonStateService/PutYnisonState"
        );
        assert!(client.state_url("evil.example/x?").is_err());
    }
}
