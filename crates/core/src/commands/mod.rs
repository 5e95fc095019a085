pub mod confirm;
pub mod executor;
pub mod parser;
pub mod session;

pub use confirm::{Confirmation, classify};
pub use executor::CommandExecutor;
pub use parser::{CommandParser, parse};
pub use session::{InMemorySessionStore, SessionStore};
