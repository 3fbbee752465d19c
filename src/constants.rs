pub const DEFAULT_SERVER: &str = "irc.chat.twitch.tv:6667";

pub const CR_LF: &str = "\r\n";

// IRC COMMUNICATION COMMANDS
pub const IRC_COMMAND_PASS: &str = "PASS";
pub const IRC_COMMAND_NICK: &str = "NICK";
pub const IRC_COMMAND_CAP_REQ: &str = "CAP REQ";
pub const IRC_COMMAND_JOIN: &str = "JOIN";
pub const IRC_COMMAND_PART: &str = "PART";
pub const IRC_COMMAND_CHAT: &str = "PRIVMSG";
pub const IRC_COMMAND_PONG: &str = "PONG";

pub const OAUTH_PREFIX: &str = "oauth:";

/// Requested on the receive socket only
pub const CAPABILITIES: [&str; 3] = ["twitch.tv/tags", "twitch.tv/membership", "twitch.tv/commands"];

/// Nick prefix Twitch accepts for read-only, unauthenticated viewers
pub const ANONYMOUS_NICK_PREFIX: &str = "justinfan";
pub const ANONYMOUS_NICK_MIN: u32 = 1;
pub const ANONYMOUS_NICK_MAX: u32 = 9_999_999;

pub const CTCP_DELIM: char = '\u{1}';

pub const ENV_PREFIX: &str = "TMI_";
pub const DEFAULT_LOG_FILTER: &str = "tmi_duplex=debug,info";
