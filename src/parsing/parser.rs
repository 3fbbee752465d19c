use thiserror::Error;
use tracing::{trace, warn};

use super::commands::{
    Badge, Cap, CapSubCommand, ChannelMode, ChannelState, ClearChat, ClearMsg, Command,
    CommandKind, EmoteRef, Membership, Message, Notice, Ping, Privmsg, Reply, ReplyKind,
    UserModes, UserNotice,
};
use super::lexer::Lexer;
use super::tags::Tags;
use crate::constants::CTCP_DELIM;

pub type ParseResult<T> = core::result::Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("cannot find a command in message - raw: {0}")]
    MissingCommand(String),
}

/// Decodes one raw protocol line (with or without its trailing CR/LF).
///
/// Unknown command words decode to [`Command::Unhandled`]; only a line without any command word
/// is an error.
pub fn decode(raw: &str) -> ParseResult<Message> {
    let input = raw.trim_end_matches(['\r', '\n']);
    trace!(line = input, "decoding line");

    let mut lexer = Lexer::new(input);

    let tags = if lexer.eat('@') {
        let tags = Tags::parse(lexer.word().unwrap_or_default());
        lexer.skip_spaces();
        Some(tags)
    } else {
        None
    };

    let (nick, user, host) = if lexer.eat(':') {
        let prefix = parse_prefix(lexer.word().unwrap_or_default());
        lexer.skip_spaces();
        prefix
    } else {
        (None, None, None)
    };

    let word = lexer
        .word()
        .ok_or_else(|| ParseError::MissingCommand(input.to_string()))?;
    lexer.skip_spaces();

    let command = match CommandKind::from_word(word) {
        CommandKind::Reply => Command::Reply(Reply {
            code: word.to_string(),
            kind: ReplyKind::from_code(word),
            text: rest(&mut lexer),
        }),
        CommandKind::Ping => Command::Ping(Ping {
            server: rest(&mut lexer),
        }),
        CommandKind::Privmsg => Command::Privmsg(parse_privmsg(&mut lexer, tags.as_ref())),
        CommandKind::Notice => Command::Notice(Notice {
            target: next_word(&mut lexer),
            message: trailing(&mut lexer).unwrap_or_default(),
        }),
        CommandKind::Join => Command::Join(Membership {
            channel: next_word(&mut lexer),
        }),
        CommandKind::Part => Command::Part(Membership {
            channel: next_word(&mut lexer),
        }),
        CommandKind::Cap => parse_cap(&mut lexer),
        CommandKind::ChannelMode => Command::ChannelMode(ChannelMode {
            channel: next_word(&mut lexer),
            modes: optional_word(&mut lexer),
            nick: optional_word(&mut lexer),
        }),
        CommandKind::UserState => Command::UserState(ChannelState {
            channel: next_word(&mut lexer),
        }),
        CommandKind::RoomState => Command::RoomState(ChannelState {
            channel: next_word(&mut lexer),
        }),
        CommandKind::ClearChat => Command::ClearChat(ClearChat {
            channel: next_word(&mut lexer),
            target: trailing(&mut lexer).filter(|target| !target.is_empty()),
        }),
        CommandKind::UserNotice => Command::UserNotice(UserNotice {
            channel: next_word(&mut lexer),
            message: trailing(&mut lexer),
            msg_id: tags
                .as_ref()
                .and_then(|t| t.get("msg-id"))
                .map(str::to_string),
        }),
        CommandKind::ClearMsg => Command::ClearMsg(ClearMsg {
            channel: next_word(&mut lexer),
            target_msg_id: tags
                .as_ref()
                .and_then(|t| t.get("target-msg-id"))
                .map(str::to_string),
        }),
        CommandKind::Unhandled => {
            warn!(command = word, "unhandled IRC command");
            Command::Unhandled(word.to_string())
        }
    };

    Ok(Message {
        nick,
        user,
        host,
        tags,
        command,
    })
}

/// Splits `nick!user@host`; pieces missing from the prefix stay `None`, and a bare prefix
/// (`tmi.twitch.tv`) is a host.
fn parse_prefix(prefix: &str) -> (Option<String>, Option<String>, Option<String>) {
    let (nick, rest) = match prefix.split_once('!') {
        Some((nick, rest)) => (Some(nick.to_string()), rest),
        None => (None, prefix),
    };

    let (user, host) = match rest.split_once('@') {
        Some((user, host)) => (Some(user.to_string()), host),
        None => (None, rest),
    };

    let host = (!host.is_empty()).then(|| host.to_string());
    (nick, user, host)
}

fn parse_cap(lexer: &mut Lexer) -> Command {
    let target = next_word(lexer);
    lexer.skip_spaces();
    let sub_command = CapSubCommand::from(lexer.word().unwrap_or_default());
    lexer.skip_spaces();
    lexer.eat(':');
    let parameter = lexer.rest().map(str::to_string);

    Command::Cap(Cap {
        target,
        sub_command,
        parameter,
    })
}

fn parse_privmsg(lexer: &mut Lexer, tags: Option<&Tags>) -> Privmsg {
    let target = next_word(lexer);
    let body = trailing(lexer).unwrap_or_default();
    let (message, action) = strip_ctcp_action(body);

    let mut privmsg = Privmsg {
        target,
        message,
        action,
        user_modes: UserModes::empty(),
        colour: None,
        display_name: None,
        badges: Vec::new(),
        emotes: Vec::new(),
    };

    let Some(tags) = tags else {
        return privmsg;
    };

    if tags.flag("subscriber") {
        privmsg.user_modes.insert(UserModes::SUBSCRIBER);
    }
    if tags.flag("turbo") {
        privmsg.user_modes.insert(UserModes::TURBO);
    }
    if let Some(user_type) = tags.get("user-type") {
        privmsg.user_modes.insert(UserModes::from_user_type(user_type));
    }

    privmsg.badges = tags.get("badges").map(parse_badges).unwrap_or_default();
    if privmsg.badges.iter().any(|b| b.name == "broadcaster") {
        privmsg.user_modes.insert(UserModes::BROADCASTER);
    }

    privmsg.colour = tags.get("color").map(str::to_string);
    privmsg.display_name = tags.get("display-name").map(str::to_string);
    privmsg.emotes = tags.get("emotes").map(parse_emotes).unwrap_or_default();

    privmsg
}

/// `\x01ACTION waves\x01` becomes `waves`; other CTCP bodies are left as received
fn strip_ctcp_action(body: String) -> (String, bool) {
    let action = body
        .strip_prefix(CTCP_DELIM)
        .map(|inner| inner.strip_suffix(CTCP_DELIM).unwrap_or(inner))
        .and_then(|inner| match inner.split_once(' ') {
            Some(("ACTION", text)) => Some(text.to_string()),
            None if inner == "ACTION" => Some(String::new()),
            _ => None,
        });

    match action {
        Some(text) => (text, true),
        None => (body, false),
    }
}

fn parse_badges(raw: &str) -> Vec<Badge> {
    raw.split(',')
        .filter(|badge| !badge.is_empty())
        .map(|badge| match badge.split_once('/') {
            Some((name, version)) => Badge {
                name: name.to_string(),
                version: Some(version.to_string()),
            },
            None => Badge {
                name: badge.to_string(),
                version: None,
            },
        })
        .collect()
}

/// `id:start-end,start-end/id:start-end`
fn parse_emotes(raw: &str) -> Vec<EmoteRef> {
    let mut emotes = Vec::new();

    for group in raw.split('/').filter(|group| !group.is_empty()) {
        let Some((id, ranges)) = group.split_once(':') else {
            warn!(group, "emote entry without index ranges");
            continue;
        };

        let Ok(id) = id.parse::<u64>() else {
            warn!(id, "non-numeric emote id");
            continue;
        };

        for range in ranges.split(',') {
            let parsed = range
                .split_once('-')
                .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));

            match parsed {
                Some((start, end)) => emotes.push(EmoteRef {
                    start,
                    end,
                    id,
                    image: None,
                }),
                None => warn!(range, id, "invalid emote index range"),
            }
        }
    }

    // stable: equal starts keep input order
    emotes.sort_by_key(|emote| emote.start);
    emotes
}

fn next_word(lexer: &mut Lexer) -> String {
    lexer.skip_spaces();
    lexer.word().unwrap_or_default().to_string()
}

fn optional_word(lexer: &mut Lexer) -> Option<String> {
    lexer.skip_spaces();
    lexer.word().map(str::to_string)
}

/// Text after the first `:` of the remaining params; without a `:` the remaining text is used
fn trailing(lexer: &mut Lexer) -> Option<String> {
    let rest = lexer.rest()?;
    let text = match rest.split_once(':') {
        Some((_, text)) => text,
        None => rest.trim_start_matches(' '),
    };

    Some(text.to_string())
}

fn rest(lexer: &mut Lexer) -> String {
    lexer.rest().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_end_to_end_privmsg() {
        let line = "@color=#FF0000;display-name=Foo;subscriber=1;emotes=25:0-4 :foo!foo@foo.tmi.twitch.tv PRIVMSG #bar :Kappa hello";
        let msg = decode(line).unwrap();

        assert_eq!(msg.nick.as_deref(), Some("foo"));
        assert_eq!(msg.user.as_deref(), Some("foo"));
        assert_eq!(msg.host.as_deref(), Some("foo.tmi.twitch.tv"));

        let Command::Privmsg(privmsg) = msg.command else {
            panic!("expected PRIVMSG, got {:?}", msg.command);
        };

        assert_eq!(privmsg.target, "#bar");
        assert_eq!(privmsg.message, "Kappa hello");
        assert_eq!(privmsg.display_name.as_deref(), Some("Foo"));
        assert_eq!(privmsg.colour.as_deref(), Some("#FF0000"));
        assert!(privmsg.user_modes.contains(UserModes::SUBSCRIBER));
        assert!(!privmsg.user_modes.contains(UserModes::TURBO));
        assert!(!privmsg.action);

        assert_eq!(privmsg.emotes.len(), 1);
        let emote = &privmsg.emotes[0];
        assert_eq!((emote.id, emote.start, emote.end), (25, 0, 4));
        assert!(emote.image.is_none());
    }

    #[test]
    fn test_repeated_tag_last_wins() {
        let line = "@display-name=First;color=;display-name=Second :a!a@a PRIVMSG #c :hi";
        let msg = decode(line).unwrap();

        assert_eq!(msg.tag("display-name"), Some("Second"));
        let Command::Privmsg(privmsg) = msg.command else {
            panic!("expected PRIVMSG");
        };
        assert_eq!(privmsg.display_name.as_deref(), Some("Second"));
        assert_eq!(privmsg.colour.as_deref(), Some(""));
    }

    #[test]
    fn test_emotes_sorted_and_disjoint() {
        let line = "@emotes=1902:12-16/25:0-4,6-10/354:18-22 :a!a@a PRIVMSG #c :Kappa Kappa Keepo Kreygasm";
        let msg = decode(line).unwrap();
        let Command::Privmsg(privmsg) = msg.command else {
            panic!("expected PRIVMSG");
        };

        let spans: Vec<_> = privmsg
            .emotes
            .iter()
            .map(|e| (e.id, e.start, e.end))
            .collect();
        assert_eq!(
            spans,
            vec![(25, 0, 4), (25, 6, 10), (1902, 12, 16), (354, 18, 22)]
        );

        for pair in privmsg.emotes.windows(2) {
            assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn test_malformed_emotes_are_skipped() {
        let line = "@emotes=abc:0-4/25:x-4,6-10/7 :a!a@a PRIVMSG #c :body";
        let Command::Privmsg(privmsg) = decode(line).unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert_eq!(privmsg.emotes.len(), 1);
        assert_eq!(privmsg.emotes[0].start, 6);
    }

    #[test]
    fn test_user_type_and_badges() {
        let line = "@badges=broadcaster/1,turbo/1;turbo=1;user-type=staff :a!a@a PRIVMSG #a :hey";
        let Command::Privmsg(privmsg) = decode(line).unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert!(privmsg.user_modes.contains(UserModes::STAFF));
        assert!(privmsg.user_modes.contains(UserModes::TURBO));
        assert!(privmsg.user_modes.contains(UserModes::BROADCASTER));
        assert!(!privmsg.user_modes.contains(UserModes::MOD));
        assert_eq!(privmsg.badges[0].name, "broadcaster");
        assert_eq!(privmsg.badges[1].version.as_deref(), Some("1"));
    }

    #[test]
    fn test_unknown_user_type_leaves_bits_clear() {
        let line = "@user-type=wizard;subscriber=0 :a!a@a PRIVMSG #a :hey";
        let Command::Privmsg(privmsg) = decode(line).unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert!(privmsg.user_modes.is_empty());
    }

    #[test]
    fn test_untagged_privmsg() {
        let Command::Privmsg(privmsg) = decode(":a!a@a PRIVMSG #a :plain").unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert_eq!(privmsg.message, "plain");
        assert!(privmsg.colour.is_none());
        assert!(privmsg.display_name.is_none());
        assert!(privmsg.emotes.is_empty());
    }

    #[test]
    fn test_ctcp_action() {
        let line = ":a!a@a PRIVMSG #a :\u{1}ACTION waves hello\u{1}";
        let Command::Privmsg(privmsg) = decode(line).unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert_eq!(privmsg.message, "waves hello");
        assert!(privmsg.action);
    }

    #[test]
    fn test_other_ctcp_is_not_an_action() {
        let line = ":a!a@a PRIVMSG #a :\u{1}VERSION\u{1}";
        let Command::Privmsg(privmsg) = decode(line).unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert_eq!(privmsg.message, "\u{1}VERSION\u{1}");
        assert!(!privmsg.action);
    }

    #[test]
    fn test_body_keeps_colons() {
        let line = ":a!a@a PRIVMSG #a :time is 12:30 :)";
        let Command::Privmsg(privmsg) = decode(line).unwrap().command else {
            panic!("expected PRIVMSG");
        };

        assert_eq!(privmsg.message, "time is 12:30 :)");
    }

    #[test]
    fn test_welcome_reply() {
        let msg = decode(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!\r\n").unwrap();

        assert_eq!(msg.nick, None);
        assert_eq!(msg.user, None);
        assert_eq!(msg.host.as_deref(), Some("tmi.twitch.tv"));

        let Command::Reply(reply) = msg.command else {
            panic!("expected reply");
        };
        assert_eq!(reply.code, "001");
        assert_eq!(reply.kind, ReplyKind::Welcome);
        assert_eq!(reply.text, "justinfan123 :Welcome, GLHF!");
        assert_eq!(reply.trailing(), "Welcome, GLHF!");
    }

    #[test]
    fn test_ping_keeps_raw_param() {
        let msg = decode("PING :tmi.twitch.tv").unwrap();
        assert_eq!(
            msg.command,
            Command::Ping(Ping {
                server: ":tmi.twitch.tv".to_string()
            })
        );
    }

    #[test]
    fn test_notice() {
        let msg = decode(":tmi.twitch.tv NOTICE * :Login authentication failed").unwrap();
        assert_eq!(msg.server_text(), "Login authentication failed");
        assert_eq!(msg.kind(), CommandKind::Notice);
    }

    #[test]
    fn test_cap_ack() {
        let msg = decode(":tmi.twitch.tv CAP * ACK :twitch.tv/tags twitch.tv/commands").unwrap();
        let Command::Cap(cap) = msg.command else {
            panic!("expected CAP");
        };

        assert_eq!(cap.target, "*");
        assert_eq!(cap.sub_command, CapSubCommand::Ack);
        assert_eq!(
            cap.parameter.as_deref(),
            Some("twitch.tv/tags twitch.tv/commands")
        );
    }

    #[test]
    fn test_membership_and_state() {
        let join = decode(":foo!foo@foo.tmi.twitch.tv JOIN #bar").unwrap();
        assert_eq!(
            join.command,
            Command::Join(Membership {
                channel: "#bar".to_string()
            })
        );

        let mode = decode(":jtv MODE #bar +o foo").unwrap();
        assert_eq!(
            mode.command,
            Command::ChannelMode(ChannelMode {
                channel: "#bar".to_string(),
                modes: Some("+o".to_string()),
                nick: Some("foo".to_string()),
            })
        );

        let roomstate = decode("@emote-only=0;slow=0 :tmi.twitch.tv ROOMSTATE #bar").unwrap();
        assert_eq!(roomstate.kind(), CommandKind::RoomState);
        assert_eq!(roomstate.tag("emote-only"), Some("0"));
    }

    #[test]
    fn test_clearchat_with_and_without_target() {
        let user = decode("@ban-duration=600 :tmi.twitch.tv CLEARCHAT #bar :baduser").unwrap();
        assert_eq!(
            user.command,
            Command::ClearChat(ClearChat {
                channel: "#bar".to_string(),
                target: Some("baduser".to_string()),
            })
        );

        let room = decode(":tmi.twitch.tv CLEARCHAT #bar").unwrap();
        assert_eq!(
            room.command,
            Command::ClearChat(ClearChat {
                channel: "#bar".to_string(),
                target: None,
            })
        );
    }

    #[test]
    fn test_usernotice_and_clearmsg() {
        let notice = decode("@msg-id=raid :tmi.twitch.tv USERNOTICE #bar").unwrap();
        let Command::UserNotice(notice) = notice.command else {
            panic!("expected USERNOTICE");
        };
        assert_eq!(notice.msg_id.as_deref(), Some("raid"));
        assert_eq!(notice.message, None);

        let clear = decode("@login=foo;target-msg-id=abc-123 :tmi.twitch.tv CLEARMSG #bar :oops").unwrap();
        let Command::ClearMsg(clear) = clear.command else {
            panic!("expected CLEARMSG");
        };
        assert_eq!(clear.target_msg_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_unknown_command_is_unhandled() {
        let msg = decode(":tmi.twitch.tv HOSTTARGET #bar :baz 10").unwrap();
        assert_eq!(msg.command, Command::Unhandled("HOSTTARGET".to_string()));
    }

    #[test]
    fn test_missing_command_is_an_error() {
        assert!(matches!(decode(""), Err(ParseError::MissingCommand(_))));
        assert!(matches!(
            decode("@a=b :prefix.only"),
            Err(ParseError::MissingCommand(_))
        ));
    }

    #[test]
    fn test_numeric_replies_match_exact_token() {
        for word in ["1", "01", "0001"] {
            let Command::Reply(reply) = decode(&format!(":tmi.twitch.tv {word} foo :not welcome"))
                .unwrap()
                .command
            else {
                panic!("expected reply for {word}");
            };
            assert_eq!(reply.code, word);
            assert_eq!(reply.kind, ReplyKind::Other);
        }

        let Command::Reply(reply) = decode(":srv 99999 x").unwrap().command else {
            panic!("expected reply");
        };
        assert_eq!(reply.code, "99999");
        assert_eq!(reply.kind, ReplyKind::Other);
        assert_eq!(reply.text, "x");
    }
}
