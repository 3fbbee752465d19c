use core::fmt;

use crate::constants::{
    CAPABILITIES, CR_LF, IRC_COMMAND_CAP_REQ, IRC_COMMAND_CHAT, IRC_COMMAND_JOIN,
    IRC_COMMAND_NICK, IRC_COMMAND_PART, IRC_COMMAND_PASS, IRC_COMMAND_PONG,
    OAUTH_PREFIX,
};

/// Formats `"<command> <param>\r\n"`; the caller supplies any `:` the parameter needs.
pub fn encode(command: &str, param: &str) -> String {
    format!("{command} {param}{CR_LF}")
}

/// Lines the client writes to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Bare token, without the `oauth:` prefix
    Pass(String),
    Nick(String),
    CapReq,
    Join(String),
    Part(String),
    Privmsg { channel: String, text: String },
    Pong(String),
}

impl Outgoing {
    pub fn to_line(&self) -> String {
        match self {
            Outgoing::Pass(token) => encode(IRC_COMMAND_PASS, &format!("{OAUTH_PREFIX}{token}")),
            Outgoing::Nick(nick) => encode(IRC_COMMAND_NICK, nick),
            Outgoing::CapReq => encode(IRC_COMMAND_CAP_REQ, &format!(":{}", CAPABILITIES.join(" "))),
            Outgoing::Join(channel) => encode(IRC_COMMAND_JOIN, channel),
            Outgoing::Part(channel) => encode(IRC_COMMAND_PART, channel),
            Outgoing::Privmsg { channel, text } => {
                encode(IRC_COMMAND_CHAT, &format!("{channel} :{text}"))
            }
            Outgoing::Pong(server) => encode(IRC_COMMAND_PONG, server),
        }
    }
}

/// Log-safe rendering; the token in PASS never reaches a log line.
impl fmt::Display for Outgoing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outgoing::Pass(_) => write!(f, "{IRC_COMMAND_PASS} {OAUTH_PREFIX}***"),
            other => f.write_str(other.to_line().trim_end_matches(CR_LF)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::commands::Command;
    use crate::parsing::parser::decode;

    #[test]
    fn test_encode_format() {
        assert_eq!(encode("JOIN", "#bar"), "JOIN #bar\r\n");
        assert_eq!(
            Outgoing::Pass("abc123".to_string()).to_line(),
            "PASS oauth:abc123\r\n"
        );
        assert_eq!(
            Outgoing::CapReq.to_line(),
            "CAP REQ :twitch.tv/tags twitch.tv/membership twitch.tv/commands\r\n"
        );
        assert_eq!(
            Outgoing::Privmsg {
                channel: "#bar".to_string(),
                text: "hi: there".to_string()
            }
            .to_line(),
            "PRIVMSG #bar :hi: there\r\n"
        );
    }

    #[test]
    fn test_pass_is_redacted_for_logs() {
        let pass = Outgoing::Pass("supersecret".to_string());

        assert!(!pass.to_string().contains("supersecret"));
        assert_eq!(Outgoing::Nick("foo".to_string()).to_string(), "NICK foo");
    }

    #[test]
    fn test_pong_echoes_ping_server() {
        let Command::Ping(ping) = decode("PING :tmi.twitch.tv\r\n").unwrap().command else {
            panic!("expected PING");
        };

        assert_eq!(Outgoing::Pong(ping.server).to_line(), "PONG :tmi.twitch.tv\r\n");
    }

    #[test]
    fn test_encoded_ping_decodes_to_same_server() {
        let line = encode("PING", ":tmi.twitch.tv");
        let Command::Ping(ping) = decode(&line).unwrap().command else {
            panic!("expected PING");
        };
        assert_eq!(ping.server, ":tmi.twitch.tv");
    }
}
