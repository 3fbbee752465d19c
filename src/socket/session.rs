use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::core::{
    Flags, Leg, SessionError, SessionEvent, SessionResult, SessionState, Writer,
    normalize_channel,
};
use super::source::{ChatSource, EventQueue};
use super::worker::{LegWorker, send};
use crate::constants::{ANONYMOUS_NICK_MAX, ANONYMOUS_NICK_MIN, ANONYMOUS_NICK_PREFIX, OAUTH_PREFIX};
use crate::parsing::commands::{Command, ReplyKind};
use crate::parsing::{Message, Outgoing, decode};
use crate::util::services::{BadgeRole, ImageHandle, Services};

const EVENT_CAPACITY: usize = 64;

/// What a worker does after handing a line to the session
#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    /// Fatal for the session; carries the error text for the consumer
    Stop(String),
}

/// Sockets and tasks of one connected session
#[derive(Debug)]
struct Connection {
    server: String,
    recv: Writer,
    send: Writer,
    cancel: CancellationToken,
    recv_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

impl Connection {
    fn writer(&self, leg: Leg) -> &Writer {
        match leg {
            Leg::Receive => &self.recv,
            Leg::Send => &self.send,
        }
    }
}

pub(crate) struct SessionInner {
    id: Uuid,
    services: Services,
    flags: Mutex<Flags>,
    connection: Mutex<Option<Connection>>,
    events: broadcast::Sender<SessionEvent>,
    source: Arc<ChatSource>,
    /// Serializes connect, join, part and disconnect
    ops: tokio::sync::Mutex<()>,
}

/// Twitch chat session over a receive socket and a send socket.
///
/// Cheap to clone; all clones drive the same session. Decoded room traffic is delivered through
/// [`ChatSource`], notifications through [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new(Services::default())
    }
}

impl ChatSession {
    pub fn new(services: Services) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                services,
                flags: Mutex::new(Flags::default()),
                connection: Mutex::new(None),
                events,
                source: Arc::new(ChatSource::new()),
                ops: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn source(&self) -> Arc<ChatSource> {
        Arc::clone(&self.inner.source)
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock_flags().state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.lock_flags().logged_in()
    }

    pub fn current_channel(&self) -> Option<String> {
        self.inner.lock_flags().channel.clone()
    }

    /// Endpoint of the live connection
    pub fn server(&self) -> Option<String> {
        self.inner.lock_connection().as_ref().map(|c| c.server.clone())
    }

    /// Opens both sockets to `server` (`host:port`) and starts the login handshake.
    ///
    /// Without a token (or without a username to go with it) the session logs in as an
    /// anonymous `justinfan` viewer. Login completes asynchronously; watch for
    /// [`SessionEvent::LoggedInChanged`].
    #[instrument(skip(self, token), fields(session = %self.inner.id))]
    pub async fn connect(
        &self,
        server: &str,
        token: Option<&str>,
        nick: Option<&str>,
    ) -> SessionResult<()> {
        let _ops = self.inner.ops.lock().await;

        let (host, port) = parse_server(server)?;
        self.inner.update_flags(|flags| {
            if flags.connected || flags.connecting {
                return Err(SessionError::AlreadyConnected);
            }
            flags.connecting = true;
            Ok(())
        })?;

        info!(host, port, "connecting");

        let (recv_stream, send_stream) = match open_pair(host, port).await {
            Ok(pair) => pair,
            Err(source) => {
                error!("failed to connect to {server}: {source}");
                self.inner.update_flags(|flags| flags.connecting = false);
                return Err(SessionError::ConnectFailed {
                    server: server.to_string(),
                    source,
                });
            }
        };

        let (recv_writer, send_writer) = self.inner.start(server, recv_stream, send_stream);

        if let Err(err) = self.authenticate(&recv_writer, &send_writer, token, nick).await {
            error!("handshake write failed: {err}");
            self.inner.teardown(None).await;
            return Err(err.into());
        }

        Ok(())
    }

    async fn authenticate(
        &self,
        recv_writer: &Writer,
        send_writer: &Writer,
        token: Option<&str>,
        nick: Option<&str>,
    ) -> std::io::Result<()> {
        let token = token
            .map(|token| token.trim())
            .map(|token| token.strip_prefix(OAUTH_PREFIX).unwrap_or(token))
            .filter(|token| !token.is_empty());
        let nick = nick.map(str::trim).filter(|nick| !nick.is_empty());

        let login = match (token, nick) {
            (Some(token), Some(nick)) => vec![
                Outgoing::Pass(token.to_string()),
                Outgoing::Nick(nick.to_lowercase()),
            ],
            (Some(_), None) => {
                warn!("oauth token without a username, logging in anonymously");
                vec![Outgoing::Nick(anonymous_nick())]
            }
            (None, _) => vec![Outgoing::Nick(anonymous_nick())],
        };

        for command in &login {
            send(recv_writer, Leg::Receive, command).await?;
        }
        for command in &login {
            send(send_writer, Leg::Send, command).await?;
        }

        send(recv_writer, Leg::Receive, &Outgoing::CapReq).await
    }

    /// Joins `channel` on both sockets, parting the current channel first if there is one.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn join(&self, channel: &str) -> SessionResult<()> {
        let _ops = self.inner.ops.lock().await;

        let (recv_writer, send_writer) = self.inner.writers().ok_or_else(|| {
            warn!("join requested while not connected");
            SessionError::NotConnected
        })?;

        let channel = normalize_channel(channel);
        let current = self.inner.lock_flags().channel.clone();

        match current {
            Some(current) if current == channel => {
                debug!(%channel, "already joined");
                return Ok(());
            }
            Some(current) => {
                info!(from = %current, to = %channel, "switching channel");
                self.inner.part_on(&recv_writer, &send_writer, &current).await?;
                self.inner.update_flags(|flags| flags.channel = None);
            }
            None => {}
        }

        info!(%channel, "joining");
        let join = Outgoing::Join(channel.clone());
        send_both(&recv_writer, &send_writer, &join).await?;
        self.inner.update_flags(|flags| flags.channel = Some(channel));

        Ok(())
    }

    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn part(&self) -> SessionResult<()> {
        let _ops = self.inner.ops.lock().await;

        let (recv_writer, send_writer) = self.inner.writers().ok_or_else(|| {
            warn!("part requested while not connected");
            SessionError::NotConnected
        })?;

        let channel = self.inner.lock_flags().channel.clone().ok_or_else(|| {
            warn!("part requested without a joined channel");
            SessionError::NoChannel
        })?;

        self.inner.part_on(&recv_writer, &send_writer, &channel).await?;
        self.inner.update_flags(|flags| flags.channel = None);

        Ok(())
    }

    /// Sends a chat message to the current channel on the send socket.
    #[instrument(skip(self, text), fields(session = %self.inner.id))]
    pub async fn send_privmsg(&self, text: &str) -> SessionResult<()> {
        let Some((_, send_writer)) = self.inner.writers() else {
            warn!("chat message dropped, not connected");
            return Err(SessionError::NotConnected);
        };

        let Some(channel) = self.current_channel() else {
            warn!("chat message dropped, no channel joined");
            return Err(SessionError::NoChannel);
        };

        let privmsg = Outgoing::Privmsg {
            channel,
            text: text.to_string(),
        };
        send(&send_writer, Leg::Send, &privmsg).await?;

        Ok(())
    }

    /// Parts, closes both sockets, waits for both workers and resets the event source.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn disconnect(&self) {
        let _ops = self.inner.ops.lock().await;
        self.inner.teardown(None).await;
    }

    /// Connects to a random server for `channel` using the configured credentials, then joins it
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn connect_and_join(&self, channel: &str) -> SessionResult<()> {
        let channel = normalize_channel(channel);
        let servers = self.inner.services.servers.chat_servers_for(&channel).await?;
        if servers.is_empty() {
            return Err(SessionError::NoServers(channel));
        }

        let server = &servers[rand::random_range(0..servers.len())];
        let (token, nick) = self.inner.services.credentials();

        self.connect(server, token.as_deref(), nick.as_deref()).await?;
        self.join(&channel).await
    }

    /// [`connect_and_join`](Self::connect_and_join) on its own task
    pub fn spawn_connect_and_join(&self, channel: impl Into<String>) -> JoinHandle<SessionResult<()>> {
        let session = self.clone();
        let channel = channel.into();

        tokio::spawn(async move { session.connect_and_join(&channel).await })
    }

    /// Badge art for `channel`, for consumers that prepare it before joining
    pub async fn badges_for(&self, channel: &str) -> SessionResult<HashMap<BadgeRole, ImageHandle>> {
        let channel = normalize_channel(channel);
        Ok(self.inner.services.images.fetch_badge_set(&channel).await?)
    }
}

impl SessionInner {
    fn lock_flags(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        _ = self.events.send(event);
    }

    /// Mutates the flags, broadcasting a state change if the derived state moved
    fn update_flags<R>(&self, update: impl FnOnce(&mut Flags) -> R) -> R {
        let mut flags = self.lock_flags();
        let before = flags.state();
        let result = update(&mut flags);
        let after = flags.state();

        if before != after {
            info!(session = %self.id, from = %before, to = %after, "session state changed");
            self.emit(SessionEvent::StateChanged(after));
        }

        result
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock_flags().connected
    }

    fn writers(&self) -> Option<(Writer, Writer)> {
        if !self.is_connected() {
            return None;
        }

        self.lock_connection()
            .as_ref()
            .map(|c| (Arc::clone(&c.recv), Arc::clone(&c.send)))
    }

    /// Spawns both workers and records the connection; returns the two writers
    fn start(self: &Arc<Self>, server: &str, recv: TcpStream, send: TcpStream) -> (Writer, Writer) {
        let (recv_reader, recv_writer) = recv.into_split();
        let (send_reader, send_writer) = send.into_split();
        let recv_writer: Writer = Arc::new(tokio::sync::Mutex::new(recv_writer));
        let send_writer: Writer = Arc::new(tokio::sync::Mutex::new(send_writer));

        let cancel = CancellationToken::new();
        let queue = self.source.queue();

        self.update_flags(|flags| {
            *flags = Flags {
                connected: true,
                ..Flags::default()
            };
        });

        // held while spawning so a worker failing on its first line sees the connection
        let mut connection = self.lock_connection();

        let worker = |leg: Leg, writer: &Writer| LegWorker {
            leg,
            session: Arc::downgrade(self),
            writer: Arc::clone(writer),
            queue: Arc::clone(&queue),
            cancel: cancel.clone(),
        };

        let recv_task = tokio::spawn(worker(Leg::Receive, &recv_writer).run(recv_reader));
        let send_task = tokio::spawn(worker(Leg::Send, &send_writer).run(send_reader));

        *connection = Some(Connection {
            server: server.to_string(),
            recv: Arc::clone(&recv_writer),
            send: Arc::clone(&send_writer),
            cancel: cancel.clone(),
            recv_task,
            send_task,
        });

        (recv_writer, send_writer)
    }

    async fn part_on(&self, recv_writer: &Writer, send_writer: &Writer, channel: &str) -> std::io::Result<()> {
        info!(session = %self.id, channel, "parting");
        send_both(recv_writer, send_writer, &Outgoing::Part(channel.to_string())).await
    }

    /// Routes one inbound line from `leg`.
    pub(crate) async fn handle_line(
        &self,
        leg: Leg,
        line: &str,
        writer: &Writer,
        queue: &EventQueue,
    ) -> Flow {
        let message = match decode(line) {
            Ok(message) => message,
            Err(err) => {
                warn!(%leg, "dropping malformed line: {err}");
                return Flow::Continue;
            }
        };

        if let Command::Ping(ping) = &message.command {
            if let Err(err) = send(writer, leg, &Outgoing::Pong(ping.server.clone())).await {
                warn!(%leg, "failed to answer PING: {err}");
            }
            return Flow::Continue;
        }

        if !self.lock_flags().leg_logged_in(leg) {
            return self.handle_login(leg, &message);
        }

        if leg == Leg::Send || !is_room_traffic(&message) {
            return Flow::Continue;
        }

        if self.lock_flags().channel.is_none() {
            debug!(kind = %message.kind(), "discarding message, no channel joined");
            return Flow::Continue;
        }

        let message = self.attach_emote_images(message).await;
        queue.push(message);

        Flow::Continue
    }

    fn handle_login(&self, leg: Leg, message: &Message) -> Flow {
        match &message.command {
            Command::Reply(reply) if reply.kind == ReplyKind::Welcome => {
                info!(session = %self.id, %leg, "logged in");
                self.update_flags(|flags| {
                    // a teardown may have cleared the flags while this line was in flight
                    if flags.connected && flags.mark_logged_in(leg) {
                        self.emit(SessionEvent::LoggedInChanged(true));
                    }
                });
                Flow::Continue
            }
            // answer to our own capability request
            Command::Cap(_) => Flow::Continue,
            _ => {
                let reply = message.server_text();
                warn!(session = %self.id, %leg, "unable to log in, server replied '{reply}'");
                let err = SessionError::LoginFailed(format!(
                    "Unable to log in on {leg} socket, server replied '{reply}'"
                ));
                Flow::Stop(err.to_string())
            }
        }
    }

    async fn attach_emote_images(&self, mut message: Message) -> Message {
        let Command::Privmsg(privmsg) = &mut message.command else {
            return message;
        };

        for emote in &mut privmsg.emotes {
            match self.services.images.fetch_emote_image(emote.id).await {
                Ok(image) => emote.image = image,
                Err(err) => warn!(id = emote.id, "emote image unavailable: {err}"),
            }
        }

        message
    }

    /// Fatal error raised by a worker: report it and tear the session down
    pub(crate) async fn fail(&self, leg: Leg, reason: String) {
        error!(session = %self.id, %leg, "{reason}");
        self.emit(SessionEvent::ErrorEncountered(reason));
        self.teardown(Some(leg)).await;
    }

    /// Single teardown path for both explicit disconnects and worker failures.
    ///
    /// `origin` is the leg whose worker is calling; that worker is not awaited.
    async fn teardown(&self, origin: Option<Leg>) {
        let Some(connection) = self.lock_connection().take() else {
            debug!(session = %self.id, "teardown without a live connection");
            self.update_flags(|flags| *flags = Flags::default());
            self.source.reset();
            return;
        };

        info!(session = %self.id, server = %connection.server, "disconnecting");

        let channel = self.lock_flags().channel.clone();
        if let Some(channel) = channel {
            if let Err(err) = self.part_on(&connection.recv, &connection.send, &channel).await {
                warn!(session = %self.id, "failed to part {channel}: {err}");
            }
        }

        // old workers still hold the stale queue; closing it drops anything they push
        self.source.reset();

        self.update_flags(|flags| {
            *flags = Flags::default();
            self.emit(SessionEvent::LoggedInChanged(false));
        });

        connection.cancel.cancel();
        for leg in [Leg::Receive, Leg::Send] {
            if let Err(err) = connection.writer(leg).lock().await.shutdown().await {
                debug!(%leg, "socket shutdown: {err}");
            }
        }

        let (legs, tasks): (Vec<_>, Vec<_>) = [
            (Leg::Receive, connection.recv_task),
            (Leg::Send, connection.send_task),
        ]
        .into_iter()
        .filter(|(leg, _)| origin != Some(*leg))
        .unzip();

        for (leg, joined) in legs.into_iter().zip(join_all(tasks).await) {
            if let Err(err) = joined {
                error!(%leg, "chat worker panicked: {err}");
            }
        }

        info!(session = %self.id, "disconnected");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let connection = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(connection) = connection.take() {
            connection.cancel.cancel();
        }
    }
}

/// Only room traffic reaches the queue
fn is_room_traffic(message: &Message) -> bool {
    match &message.command {
        Command::Reply(reply) => !reply.kind.is_handshake(),
        Command::Ping(_) | Command::Unhandled(_) => false,
        _ => true,
    }
}

async fn send_both(recv_writer: &Writer, send_writer: &Writer, command: &Outgoing) -> std::io::Result<()> {
    send(recv_writer, Leg::Receive, command).await?;
    send(send_writer, Leg::Send, command).await
}

async fn open_pair(host: &str, port: u16) -> std::io::Result<(TcpStream, TcpStream)> {
    let recv = TcpStream::connect((host, port)).await?;
    let send = TcpStream::connect((host, port)).await?;

    Ok((recv, send))
}

fn parse_server(server: &str) -> SessionResult<(&str, u16)> {
    let invalid = || SessionError::InvalidServer(server.to_string());

    let (host, port) = server.trim().rsplit_once(':').ok_or_else(invalid)?;
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    if host.is_empty() {
        return Err(invalid());
    }

    Ok((host, port))
}

fn anonymous_nick() -> String {
    let id = rand::random_range(ANONYMOUS_NICK_MIN..=ANONYMOUS_NICK_MAX);
    format!("{ANONYMOUS_NICK_PREFIX}{id}")
}
