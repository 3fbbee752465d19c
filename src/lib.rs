//! Twitch chat client that keeps two IRC connections per session: one that receives room traffic
//! and one that is only used to send chat messages.
//!
//! [`ChatSession`] performs the handshake on both sockets and routes decoded lines;
//! [`ChatSource`] hands room traffic to a single consumer loop.

pub mod constants;
pub mod parsing;
pub mod socket;
pub mod util;

pub use parsing::{Command, CommandKind, Message, Outgoing, ParseError, decode, encode};
pub use socket::{ChatSession, ChatSource, Leg, SessionError, SessionEvent, SessionResult, SessionState};
pub use util::services::{
    BadgeRole, CredentialProvider, ImageHandle, ImageService, NoImages, ServerListProvider,
    ServiceError, Services, StaticServers,
};
