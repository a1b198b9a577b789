//! One sync cycle: session, catalog, status and profile.
//!
//! The [`Syncer`] owns every handle a cycle needs. It is created at start,
//! and recreated on reload; nothing is cached outside of it.

use std::sync::Arc;

use crate::{
    alert::{Alerter, Topic},
    catalog::Catalog,
    config::Config,
    engine::{Engine, Outcome},
    error::{Error, ErrorKind, Result},
    memory::{JsonFile, Record, Store},
    playback::Playback,
    profile::{BotProfile, Memory, Profile},
    retry,
    status::Formatter,
    telegram::Bot,
    ynison,
};

pub struct Syncer {
    ynison: ynison::Client,
    catalog: Catalog,
    formatter: Formatter,
    engine: Engine,
    alerter: Alerter,
}

impl Syncer {
    /// Wires up the handles for `config`.
    ///
    /// The profile is the bot's description when a bot is configured, and
    /// an in-memory field otherwise or when `dry_run` is set. The record is
    /// read from the state file; an unreadable file starts an empty record.
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be created.
    pub fn new(config: &Config, dry_run: bool) -> Result<Self> {
        let bot = config
            .telegram
            .as_ref()
            .map(|telegram| Bot::new(config, &telegram.bot_token).map(Arc::new))
            .transpose()?;

        let profile: Box<dyn Profile> = match &bot {
            Some(bot) if !dry_run => Box::new(BotProfile::new(Arc::clone(bot))),
            _ => {
                if dry_run {
                    info!("dry run: statuses are not published");
                } else {
                    warn!("no bot token configured: statuses are not published");
                }
                Box::new(Memory::new(config.initial_bio.clone()).with_ceiling(BotProfile::CEILING))
            }
        };

        let store: Box<dyn Store> = Box::new(JsonFile::open_or_empty(&config.state_file));

        let alerter = match (bot, config.telegram.as_ref()) {
            (Some(bot), Some(telegram)) => match &telegram.chat_id {
                Some(chat_id) => Alerter::with_chat(
                    bot,
                    chat_id.clone(),
                    telegram.playback_thread,
                    telegram.profile_thread,
                ),
                None => Alerter::log_only(),
            },
            _ => Alerter::log_only(),
        };

        Ok(Self::with_parts(
            ynison::Client::new(config),
            Catalog::new(config)?,
            profile,
            store,
            alerter,
            &config.initial_bio,
        ))
    }

    /// Assembles a syncer from its parts.
    #[must_use]
    pub fn with_parts(
        ynison: ynison::Client,
        catalog: Catalog,
        profile: Box<dyn Profile>,
        store: Box<dyn Store>,
        alerter: Alerter,
        initial_bio: &str,
    ) -> Self {
        Self {
            ynison,
            catalog,
            formatter: Formatter::new(),
            engine: Engine::new(profile, Record::new(store, initial_bio)),
            alerter,
        }
    }

    #[must_use]
    pub fn alerter(&self) -> &Alerter {
        &self.alerter
    }

    /// Looks up what is playing.
    ///
    /// Paused sessions are idle and do not cost a catalog lookup.
    pub async fn playback(&self) -> Playback {
        let ynison = &self.ynison;
        let state = match retry::rate_limited(move || ynison.player_state()).await {
            Ok(state) => state,
            Err(e) => return Playback::Unavailable(e),
        };

        let track_id = match &state.track_id {
            Some(id) if state.is_playing => id.as_str(),
            _ => return Playback::Idle,
        };

        let catalog = &self.catalog;
        match retry::rate_limited(move || catalog.track(track_id)).await {
            Ok(track) => Playback::playing(track, state),
            Err(e) => Playback::Unavailable(e),
        }
    }

    /// Runs one cycle.
    ///
    /// When playback cannot be determined the cycle ends without touching
    /// the profile, so a flaky session never restores the user's text in
    /// the middle of a song.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the cycle early.
    pub async fn cycle(&mut self) -> Result<Outcome> {
        let playback = self.playback().await;
        debug!("playback: {playback}");

        let desired = match playback {
            Playback::Unavailable(e) => return Err(e),
            Playback::Idle => None,
            Playback::Playing { track, state } => {
                let status = self.formatter.format(&track, &state);
                if status.is_none() {
                    let budget = self.formatter.budget();
                    self.alerter
                        .warn(
                            Topic::Profile,
                            &format!("no status fits {budget} characters for {track}"),
                        )
                        .await;
                }
                status
            }
        };

        let outcome = self.engine.reconcile(desired.as_deref()).await?;
        match &outcome {
            Outcome::Updated(text) => {
                self.alerter
                    .info(Topic::Profile, &format!("Bio updated: {text}"))
                    .await;
            }
            Outcome::Restored(text) => {
                self.alerter
                    .info(Topic::Profile, &format!("Bio restored: {text}"))
                    .await;
            }
            Outcome::Unchanged => debug!("profile unchanged"),
        }

        Ok(outcome)
    }

    /// Reports the error that ended a cycle.
    pub async fn report(&self, error: &Error) {
        let topic = match error.kind {
            ErrorKind::OutOfRange | ErrorKind::DataLoss => Topic::Profile,
            _ => Topic::Playback,
        };

        match error.kind {
            ErrorKind::NotFound | ErrorKind::ResourceExhausted => {
                self.alerter.warn(topic, &format!("cycle skipped: {error}")).await;
            }
            _ if error.is_connection() => {
                self.alerter.warn(topic, &format!("cycle skipped: {error}")).await;
            }
            _ => {
                self.alerter.error(topic, &format!("cycle failed: {error}")).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use futures_util::{SinkExt, StreamExt};
    use http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };
    use tokio_tungstenite::tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    };
    use url::Url;

    use super::*;
    use crate::memory::InMemory;

    /// Serves websocket sessions, answering each with the next reply.
    ///
    /// State queries get their reply after the client's message, redirects
    /// right away.
    async fn ynison_server(replies: Vec<(bool, String)>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (wait_for_query, reply) in replies {
                let (stream, _) = listener.accept().await.unwrap();
                let callback = |_: &Request, mut response: Response| {
                    response
                        .headers_mut()
                        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("Bearer"));
                    Ok::<_, ErrorResponse>(response)
                };
                let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                    .await
                    .unwrap();
                if wait_for_query {
                    ws.next().await;
                }
                ws.send(Message::text(reply)).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            }
        });

        addr
    }

    /// Serves catalog lookups of track 9982 with the same body.
    ///
    /// Anything else, including a request cut short, drops the connection
    /// and so fails the cycle.
    async fn catalog_server(body: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut head: Vec<u8> = Vec::new();
                let mut buffer = [0; 1024];
                while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                    let read = stream.read(&mut buffer).await.unwrap();
                    assert!(read > 0, "connection closed before the request head");
                    head.extend_from_slice(&buffer[..read]);
                }
                assert!(head.starts_with(b"GET /tracks/9982 "));

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        url
    }

    fn session(paused: bool) -> String {
        format!(
            r#"{{"player_state": {{
                "player_queue": {{"current_playable_index": 0, "playable_list": [{{"playable_id": "9982"}}]}},
                "status": {{"paused": {paused}, "progress_ms": 65000, "duration_ms": 185000}}
            }}}}"#
        )
    }

    async fn syncer(cycles: &[bool], profile: &Memory) -> Syncer {
        let state = ynison_server(
            cycles
                .iter()
                .map(|paused| (true, session(*paused)))
                .collect(),
        )
        .await;
        let redirects = ynison_server(
            cycles
                .iter()
                .map(|_| {
                    (
                        false,
                        format!(r#"{{"host": "{state}", "redirect_ticket": "T"}}"#),
                    )
                })
                .collect(),
        )
        .await;
        let catalog = catalog_server(
            r#"{"result": [{"title": "Song", "artists": [{"name": "A"}], "durationMs": 185000}]}"#,
        )
        .await;

        let mut config = Config::with_token("y0_test".parse().unwrap());
        config.redirect_url = Url::parse(&format!("ws://{redirects}/redirect")).unwrap();
        config.catalog_url = catalog;
        config.snapshot_file = None;

        Syncer::with_parts(
            ynison::Client::new(&config),
            Catalog::new(&config).unwrap(),
            Box::new(profile.clone()),
            Box::new(InMemory::default()),
            Alerter::log_only(),
            "",
        )
    }

    #[tokio::test]
    async fn writes_status_then_restores() {
        let profile = Memory::new("hello world");
        let mut syncer = syncer(&[false, true], &profile).await;

        let outcome = syncer.cycle().await.unwrap();
        let Outcome::Updated(status) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(status, "🎶 Now Playing: Song - A 1:05/3:05");
        assert_eq!(profile.text(), status);

        let outcome = syncer.cycle().await.unwrap();
        assert_eq!(outcome, Outcome::Restored("hello world".to_owned()));
        assert_eq!(profile.text(), "hello world");
    }

    #[tokio::test]
    async fn unavailable_session_leaves_profile_alone() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let profile = Memory::new("🎶 : Song");
        let mut config = Config::with_token("y0_test".parse().unwrap());
        config.redirect_url = Url::parse(&format!("ws://{addr}/redirect")).unwrap();
        let mut syncer = Syncer::with_parts(
            ynison::Client::new(&config),
            Catalog::new(&config).unwrap(),
            Box::new(profile.clone()),
            Box::new(InMemory::default()),
            Alerter::log_only(),
            "hello world",
        );

        let error = syncer.cycle().await.unwrap_err();
        assert!(error.is_connection());
        assert_eq!(profile.text(), "🎶 : Song");
        syncer.report(&error).await;
    }
}
