use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::util::services::ServiceError;

pub type SessionResult<T> = core::result::Result<T, SessionError>;

/// Write half of one leg, shared between the session and that leg's worker (for PONG)
pub type Writer = Arc<Mutex<OwnedWriteHalf>>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {server}: {source}")]
    ConnectFailed {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid chat server '{0}', expected host:port")]
    InvalidServer(String),

    #[error("no chat servers available for '{0}'")]
    NoServers(String),

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("session is not connected")]
    NotConnected,

    #[error("no channel joined")]
    NoChannel,

    #[error("{0}")]
    LoginFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Notifications for the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Fatal per-session error; the session tears itself down after emitting it
    ErrorEncountered(String),
    /// Composite login state of both legs
    LoggedInChanged(bool),
    StateChanged(SessionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    LoggedIn,
    Joined,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::LoggedIn => "logged-in",
            SessionState::Joined => "joined",
        };

        f.write_str(s)
    }
}

/// Which of the two sockets a line travelled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    Receive,
    Send,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Receive => f.write_str("receive"),
            Leg::Send => f.write_str("send"),
        }
    }
}

/// Flags guarded by the session's state mutex.
#[derive(Debug, Default, Clone)]
pub(crate) struct Flags {
    pub connecting: bool,
    pub connected: bool,
    pub recv_logged_in: bool,
    pub send_logged_in: bool,
    pub channel: Option<String>,
}

impl Flags {
    pub fn logged_in(&self) -> bool {
        self.recv_logged_in && self.send_logged_in
    }

    pub fn leg_logged_in(&self, leg: Leg) -> bool {
        match leg {
            Leg::Receive => self.recv_logged_in,
            Leg::Send => self.send_logged_in,
        }
    }

    /// Marks `leg` as logged in; true only when this call completes the composite login
    pub fn mark_logged_in(&mut self, leg: Leg) -> bool {
        let before = self.logged_in();
        match leg {
            Leg::Receive => self.recv_logged_in = true,
            Leg::Send => self.send_logged_in = true,
        }

        !before && self.logged_in()
    }

    pub fn state(&self) -> SessionState {
        if !self.connected {
            if self.connecting {
                return SessionState::Connecting;
            }
            return SessionState::Disconnected;
        }

        match (self.logged_in(), self.channel.is_some()) {
            (true, true) => SessionState::Joined,
            (true, false) => SessionState::LoggedIn,
            (false, _) => SessionState::Connected,
        }
    }
}

/// Adds a leading `#` when missing
pub fn normalize_channel(channel: &str) -> String {
    let channel = channel.trim();
    if channel.starts_with('#') {
        channel.to_string()
    } else {
        format!("#{channel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_login_fires_once() {
        let mut flags = Flags {
            connected: true,
            ..Default::default()
        };

        assert!(!flags.mark_logged_in(Leg::Send));
        assert_eq!(flags.state(), SessionState::Connected);
        assert!(flags.mark_logged_in(Leg::Receive));
        assert!(!flags.mark_logged_in(Leg::Receive));
        assert_eq!(flags.state(), SessionState::LoggedIn);

        flags.channel = Some("#bar".to_string());
        assert_eq!(flags.state(), SessionState::Joined);
    }

    #[test]
    fn test_state_when_not_connected() {
        let mut flags = Flags::default();
        assert_eq!(flags.state(), SessionState::Disconnected);

        flags.connecting = true;
        assert_eq!(flags.state(), SessionState::Connecting);
    }

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("bar"), "#bar");
        assert_eq!(normalize_channel("#bar"), "#bar");
        assert_eq!(normalize_channel(" bar "), "#bar");
    }
}
