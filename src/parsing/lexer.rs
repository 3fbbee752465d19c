/// Cursor over a single IRC line.
///
/// Every method advances by whole `char`s, so slicing never lands inside a multi-byte sequence
/// (emoji in chat bodies and display names are common).
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    byte_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, byte_pos: 0 }
    }

    /// Checks the character under the cursor without advancing
    pub fn peek(&self) -> Option<char> {
        self.input[self.byte_pos..].chars().next()
    }

    /// Consumes `expected` if it is under the cursor
    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.byte_pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// IRC separates tokens with plain spaces; tabs and other whitespace are data.
    pub fn skip_spaces(&mut self) {
        while self.eat(' ') {}
    }

    /// Consumes the next space-delimited token
    pub fn word(&mut self) -> Option<&'a str> {
        self.until(&[' '])
    }

    /// Consumes characters until one of `delims` is under the cursor (the delimiter itself is
    /// left in place)
    pub fn until(&mut self, delims: &[char]) -> Option<&'a str> {
        let start = self.byte_pos;
        while let Some(ch) = self.peek() {
            if delims.contains(&ch) {
                break;
            }
            self.byte_pos += ch.len_utf8();
        }

        if start == self.byte_pos {
            None
        } else {
            Some(&self.input[start..self.byte_pos])
        }
    }

    /// Consumes and returns whatever is left of the line
    pub fn rest(&mut self) -> Option<&'a str> {
        if self.is_eof() {
            return None;
        }

        let rest = &self.input[self.byte_pos..];
        self.byte_pos = self.input.len();
        Some(rest)
    }

    pub fn is_eof(&self) -> bool {
        self.byte_pos >= self.input.len()
    }
}
