//! Track metadata from the Yandex Music catalog.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http,
    playback::Track,
    protocol::{self, catalog},
};

/// Catalog client.
pub struct Catalog {
    http: http::Client,
    base_url: Url,
}

impl Catalog {
    /// Creates a catalog client that authenticates with the configured
    /// token.
    ///
    /// # Errors
    ///
    /// Returns error if the token cannot go into a header or the HTTP
    /// client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        let mut authorization = HeaderValue::from_str(&format!("OAuth {}", config.token))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, authorization);

        Ok(Self {
            http: http::Client::new(config, headers)?,
            base_url: config.catalog_url.clone(),
        })
    }

    /// Looks up a single track.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the catalog does not know the track or it has no
    ///   title
    /// * `ResourceExhausted` with a retry hint when rate limited
    /// * `InvalidArgument` if the response cannot be parsed
    pub async fn track(&self, id: &str) -> Result<Track> {
        let url = self.base_url.join(&format!("tracks/{id}"))?;
        let request = self.http.get(url, "");
        let response = http::Client::ensure_success(self.http.execute(request).await?)?;
        let body = response.text().await?;

        let response: catalog::Response<Vec<catalog::Track>> =
            protocol::json(&body, "tracks")?;
        let track = response
            .result
            .into_iter()
            .next()
            .and_then(|track| track.into_track(id))
            .ok_or_else(|| Error::not_found(format!("track {id} not found")))?;

        debug!("track {id}: {track}");
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    use super::*;
    use crate::error::ErrorKind;

    /// Answers one HTTP request with `response` and returns the request head.
    async fn serve_once(response: String) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head: Vec<u8> = Vec::new();
            let mut buffer = [0; 1024];
            while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buffer).await.unwrap();
                assert!(read > 0, "connection closed before the request head");
                head.extend_from_slice(&buffer[..read]);
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });

        (url, handle)
    }

    fn respond(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
            body.len()
        )
    }

    fn catalog(url: Url) -> Catalog {
        let mut config = Config::with_token("y0_test".parse().unwrap());
        config.catalog_url = url;
        Catalog::new(&config).unwrap()
    }

    #[tokio::test]
    async fn looks_up_track() {
        let body = r#"{"invocationInfo": {}, "result": [{"id": "9982", "title": "Song", "artists": [{"name": "A"}], "albums": [], "durationMs": 185000}]}"#;
        let (url, server) = serve_once(respond("200 OK", "", body)).await;

        let track = catalog(url).track("9982").await.unwrap();
        assert_eq!(track.title, "Song");
        assert_eq!(track.artists, ["A"]);
        assert_eq!(track.album, None);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /tracks/9982 "));
        assert!(request.to_lowercase().contains("authorization: oauth y0_test"));
    }

    #[tokio::test]
    async fn empty_result_is_not_found() {
        let (url, _server) = serve_once(respond("200 OK", "", r#"{"result": []}"#)).await;
        let error = catalog(url).track("1").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn too_many_requests_carries_retry_after() {
        let (url, _server) =
            serve_once(respond("429 Too Many Requests", "Retry-After: 7\r\n", "{}")).await;
        let error = catalog(url).track("1").await.unwrap_err();
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));
    }
}
