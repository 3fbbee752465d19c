/// IRCv3 message tags in wire order.
///
/// Duplicate keys are kept; lookups return the last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    /// Parses the tag segment of a line, without its leading `@`.
    ///
    /// `key=value` pairs are separated by `;`. A key without `=` has an empty value.
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split(';')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), unescape(value)),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Self(pairs)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Interprets a numeric tag as a boolean (`subscriber=1`, `turbo=0`, ...).
    ///
    /// Missing, empty and non-numeric values are false.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .and_then(|value| value.parse::<i64>().ok())
            .is_some_and(|value| value != 0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        // a trailing lone backslash is dropped
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    out
}
