pub mod core;
pub mod session;
pub mod source;
mod worker;


pub use self::core::{Leg, SessionError, SessionEvent, SessionResult, SessionState};
pub use session::ChatSession;
pub use source::{ChatSource, EventQueue};
