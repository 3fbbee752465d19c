/// Palette for senders whose PRIVMSG carries no `color` tag
pub const DEFAULT_CHAT_COLOURS: [&str; 15] = [
    "#FF0000", "#0000FF", "#00FF00", "#B22222", "#FF7F50", "#9ACD32", "#FF4500", "#2E8B57",
    "#DAA520", "#D2691E", "#5F9EA0", "#1E90FF", "#FF69B4", "#8A2BE2", "#00FF7F",
];

/// Picks a stable colour for `nick` from the byte sum of the name.
///
/// Only the first 13 palette entries are reachable, matching the colours Twitch users have
/// always seen for untagged names.
pub fn fallback_colour(nick: &str) -> &'static str {
    let total: u32 = nick.bytes().map(u32::from).sum();
    DEFAULT_CHAT_COLOURS[(total % 13) as usize]
}

/// `colour` when it is set and non-empty, otherwise the nick's fallback
pub fn colour_or_fallback<'a>(colour: Option<&'a str>, nick: &str) -> &'a str {
    match colour {
        Some(colour) if !colour.is_empty() => colour,
        _ => fallback_colour(nick),
    }
}
