use core::fmt;

use super::tags::Tags;
use crate::util::services::ImageHandle;

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub nick: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub tags: Option<Tags>,
    pub command: Command,
}

impl Message {
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }

    /// Tag lookup following the tag table's last-wins rule
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref().and_then(|tags| tags.get(key))
    }

    /// Best human-readable text the server attached to this line, used when reporting a
    /// rejected login
    pub fn server_text(&self) -> String {
        match &self.command {
            Command::Notice(notice) => notice.message.clone(),
            Command::Reply(reply) => reply.trailing().to_string(),
            other => other.kind().to_string(),
        }
    }
}

/// Command-specific payload, one variant per recognized command word.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Notice(Notice),
    Privmsg(Privmsg),
    Ping(Ping),
    Reply(Reply),
    ChannelMode(ChannelMode),
    Cap(Cap),
    Join(Membership),
    Part(Membership),
    UserState(ChannelState),
    RoomState(ChannelState),
    ClearChat(ClearChat),
    UserNotice(UserNotice),
    ClearMsg(ClearMsg),
    /// Unrecognized command word; carries no payload beyond the word itself
    Unhandled(String),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Notice(_) => CommandKind::Notice,
            Command::Privmsg(_) => CommandKind::Privmsg,
            Command::Ping(_) => CommandKind::Ping,
            Command::Reply(_) => CommandKind::Reply,
            Command::ChannelMode(_) => CommandKind::ChannelMode,
            Command::Cap(_) => CommandKind::Cap,
            Command::Join(_) => CommandKind::Join,
            Command::Part(_) => CommandKind::Part,
            Command::UserState(_) => CommandKind::UserState,
            Command::RoomState(_) => CommandKind::RoomState,
            Command::ClearChat(_) => CommandKind::ClearChat,
            Command::UserNotice(_) => CommandKind::UserNotice,
            Command::ClearMsg(_) => CommandKind::ClearMsg,
            Command::Unhandled(_) => CommandKind::Unhandled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Notice,
    Privmsg,
    Ping,
    Reply,
    ChannelMode,
    Cap,
    Join,
    Part,
    UserState,
    RoomState,
    ClearChat,
    UserNotice,
    ClearMsg,
    Unhandled,
}

impl CommandKind {
    /// Maps a command word to its kind; all-digit words are numeric replies
    pub fn from_word(word: &str) -> Self {
        if !word.is_empty() && word.bytes().all(|b| b.is_ascii_digit()) {
            return CommandKind::Reply;
        }

        match word {
            "NOTICE" => CommandKind::Notice,
            "PRIVMSG" => CommandKind::Privmsg,
            "PING" => CommandKind::Ping,
            "MODE" => CommandKind::ChannelMode,
            "CAP" => CommandKind::Cap,
            "JOIN" => CommandKind::Join,
            "PART" => CommandKind::Part,
            "USERSTATE" => CommandKind::UserState,
            "ROOMSTATE" => CommandKind::RoomState,
            "CLEARCHAT" => CommandKind::ClearChat,
            "USERNOTICE" => CommandKind::UserNotice,
            "CLEARMSG" => CommandKind::ClearMsg,
            _ => CommandKind::Unhandled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Notice => "NOTICE",
            CommandKind::Privmsg => "PRIVMSG",
            CommandKind::Ping => "PING",
            CommandKind::Reply => "REPLY",
            CommandKind::ChannelMode => "MODE",
            CommandKind::Cap => "CAP",
            CommandKind::Join => "JOIN",
            CommandKind::Part => "PART",
            CommandKind::UserState => "USERSTATE",
            CommandKind::RoomState => "ROOMSTATE",
            CommandKind::ClearChat => "CLEARCHAT",
            CommandKind::UserNotice => "USERNOTICE",
            CommandKind::ClearMsg => "CLEARMSG",
            CommandKind::Unhandled => "UNHANDLED",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Privmsg {
    pub target: String,
    pub message: String,
    /// Body arrived wrapped as a CTCP ACTION (`/me`)
    pub action: bool,
    pub user_modes: UserModes,
    /// Raw `color` tag; senders without one are left as `None`
    pub colour: Option<String>,
    pub display_name: Option<String>,
    pub badges: Vec<Badge>,
    /// Sorted by `start`
    pub emotes: Vec<EmoteRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    /// Parameter text exactly as received, so the PONG can echo it back verbatim
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Numeric token exactly as received, e.g. `001`
    pub code: String,
    pub kind: ReplyKind,
    /// Everything after the numeric, e.g. `justinfan123 :Welcome, GLHF!`
    pub text: String,
}

impl Reply {
    /// Trailing parameter of the reply, or the whole text when there is none
    pub fn trailing(&self) -> &str {
        match self.text.split_once(" :") {
            Some((_, trailing)) => trailing,
            None => self.text.trim_start_matches(':'),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Welcome,
    YourHost,
    Created,
    MyInfo,
    NameReply,
    EndOfNames,
    Motd,
    MotdStart,
    EndOfMotd,
    Other,
}

impl ReplyKind {
    /// Only the three-digit spelling is recognised; `1` or `0001` are [`ReplyKind::Other`]
    pub fn from_code(code: &str) -> Self {
        match code {
            "001" => ReplyKind::Welcome,
            "002" => ReplyKind::YourHost,
            "003" => ReplyKind::Created,
            "004" => ReplyKind::MyInfo,
            "353" => ReplyKind::NameReply,
            "366" => ReplyKind::EndOfNames,
            "372" => ReplyKind::Motd,
            "375" => ReplyKind::MotdStart,
            "376" => ReplyKind::EndOfMotd,
            _ => ReplyKind::Other,
        }
    }

    /// Replies that belong to the login handshake rather than to room traffic
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            ReplyKind::Welcome
                | ReplyKind::YourHost
                | ReplyKind::Created
                | ReplyKind::MyInfo
                | ReplyKind::Motd
                | ReplyKind::MotdStart
                | ReplyKind::EndOfMotd
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMode {
    pub channel: String,
    pub modes: Option<String>,
    pub nick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cap {
    pub target: String,
    pub sub_command: CapSubCommand,
    pub parameter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapSubCommand {
    Ack,
    Nak,
    Ls,
    List,
    End,
    Req,
    Other(String),
}

impl From<&str> for CapSubCommand {
    fn from(value: &str) -> Self {
        match value {
            "ACK" => CapSubCommand::Ack,
            "NAK" => CapSubCommand::Nak,
            "LS" => CapSubCommand::Ls,
            "LIST" => CapSubCommand::List,
            "END" => CapSubCommand::End,
            "REQ" => CapSubCommand::Req,
            other => CapSubCommand::Other(other.to_string()),
        }
    }
}

/// Payload of JOIN and PART
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub channel: String,
}

/// Payload of USERSTATE and ROOMSTATE; the interesting data lives in the tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearChat {
    pub channel: String,
    /// `None` when the whole room was cleared
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotice {
    pub channel: String,
    pub message: Option<String>,
    pub msg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearMsg {
    pub channel: String,
    pub target_msg_id: Option<String>,
}

/// Emote occurrence inside a chat body, in codepoint offsets (inclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct EmoteRef {
    pub start: usize,
    pub end: usize,
    pub id: u64,
    /// Filled in by the image service before the message reaches the consumer
    pub image: Option<ImageHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub name: String,
    pub version: Option<String>,
}

/// Sender role bitmask derived from PRIVMSG tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserModes(u8);

impl UserModes {
    pub const GLOBAL_MOD: UserModes = UserModes(1);
    pub const ADMIN: UserModes = UserModes(1 << 2);
    pub const BROADCASTER: UserModes = UserModes(1 << 3);
    pub const MOD: UserModes = UserModes(1 << 4);
    pub const STAFF: UserModes = UserModes(1 << 5);
    pub const TURBO: UserModes = UserModes(1 << 6);
    pub const SUBSCRIBER: UserModes = UserModes(1 << 7);

    pub const fn empty() -> Self {
        UserModes(0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: UserModes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: UserModes) {
        self.0 |= other.0;
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// `user-type` tag values; anything else maps to no role
    pub fn from_user_type(user_type: &str) -> Self {
        match user_type {
            "mod" => UserModes::MOD,
            "global_mod" => UserModes::GLOBAL_MOD,
            "admin" => UserModes::ADMIN,
            "staff" => UserModes::STAFF,
            _ => UserModes::empty(),
        }
    }
}
