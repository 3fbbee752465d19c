use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use tmi_duplex::parsing::commands::Command;
use tmi_duplex::util::colour::colour_or_fallback;
use tmi_duplex::util::env::{ChatConfig, EnvErr};
use tmi_duplex::util::tracing::build_subscriber;
use tmi_duplex::{
    BadgeRole, ChatSession, Message, SessionError, SessionEvent, Services, StaticServers,
};

#[derive(Parser, Debug)]
#[command(version, about = "Follow a Twitch channel's chat from the terminal")]
struct Cli {
    /// Channel to join, with or without the leading `#`
    channel: String,

    /// Chat message to send once both sockets are logged in
    #[arg(short, long)]
    say: Option<String>,

    /// `host:port` to connect to instead of the configured server list
    #[arg(long)]
    server: Option<String>,
}

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not install log subscriber: {0}")]
    Tracing(String),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let config = ChatConfig::from_env()?;
    build_subscriber(config.log_filter()).map_err(|e| RunnerErr::Tracing(e.to_string()))?;

    let servers = match &args.server {
        Some(server) => StaticServers::new(vec![server.clone()]),
        None => config.server_list(),
    };
    let services = Services::default()
        .with_credentials(Arc::new(config))
        .with_servers(Arc::new(servers));
    let session = ChatSession::new(services);

    info!(channel = %args.channel, session = %session.id(), "starting chat session");

    let events = tokio::spawn(watch_events(session.clone(), args.say.clone()));
    let source = session.source();
    let consumer = tokio::spawn(async move {
        source
            .run(|message| {
                print_message(&message);
                true
            })
            .await;
    });

    session.spawn_connect_and_join(args.channel.as_str()).await.map_err(|e| {
        error!("connect task failed: {e}");
        std::io::Error::other(e)
    })??;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    session.disconnect().await;
    consumer.abort();
    events.abort();

    Ok(())
}

async fn watch_events(session: ChatSession, mut say: Option<String>) {
    let mut events = session.subscribe();

    loop {
        match events.recv().await {
            Ok(SessionEvent::LoggedInChanged(true)) => {
                info!(server = %session.server().unwrap_or_default(), "logged in");
                if let Some(text) = say.take() {
                    if let Err(err) = session.send_privmsg(&text).await {
                        warn!("could not send chat message: {err}");
                    }
                }
            }
            Ok(SessionEvent::LoggedInChanged(false)) => info!("logged out"),
            Ok(SessionEvent::ErrorEncountered(reason)) => error!("chat error: {reason}"),
            Ok(SessionEvent::StateChanged(state)) => info!(%state, "state changed"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_message(message: &Message) {
    let nick = message.nick.as_deref().unwrap_or_default();

    match &message.command {
        Command::Privmsg(privmsg) => {
            let sender = privmsg
                .display_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(nick);
            let colour = colour_or_fallback(privmsg.colour.as_deref(), nick);
            let roles: String = privmsg
                .badges
                .iter()
                .filter_map(|badge| BadgeRole::from_badge_name(&badge.name))
                .map(badge_marker)
                .collect();

            if privmsg.action {
                println!("[{}] * {roles}{sender} ({colour}) {}", privmsg.target, privmsg.message);
            } else {
                println!("[{}] {roles}{sender} ({colour}): {}", privmsg.target, privmsg.message);
            }
        }
        Command::Notice(notice) => println!("-!- {}", notice.message),
        Command::UserNotice(notice) => println!(
            "-*- {} {}",
            notice.msg_id.as_deref().unwrap_or("usernotice"),
            notice.message.as_deref().unwrap_or_default()
        ),
        Command::ClearChat(clear) => match &clear.target {
            Some(target) => println!("-x- {target} timed out in {}", clear.channel),
            None => println!("-x- chat cleared in {}", clear.channel),
        },
        other => tracing::debug!(kind = %other.kind(), nick, "room event"),
    }
}

fn badge_marker(role: BadgeRole) -> char {
    match role {
        BadgeRole::Broadcaster => '~',
        BadgeRole::Mod => '@',
        BadgeRole::Admin | BadgeRole::GlobalMod | BadgeRole::Staff => '!',
        BadgeRole::Subscriber => '+',
        BadgeRole::Turbo => '*',
    }
}
