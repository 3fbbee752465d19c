pub mod commands;
pub mod encode;
pub mod lexer;
pub mod parser;
pub mod tags;

pub use commands::{Command, CommandKind, Message};
pub use encode::{Outgoing, encode};
pub use parser::{ParseError, ParseResult, decode};
