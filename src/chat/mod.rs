pub mod completion;
pub mod session;


pub use completion::{Completion, CompletionClient};
pub use session::{AssistantSession, SessionSummary, Turn};
