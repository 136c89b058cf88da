//! gpt-with-context - ask a chat model about a hand-picked set of project files
//!
//! Files are selected with comma-separated glob patterns, filtered by the
//! project's root `.gitignore`, summarized as line and character counts, and
//! bundled into a prompt whose answer is streamed back as it arrives.

pub mod config;
pub mod context;
pub mod llm;
pub mod session;
pub mod state;
pub mod ui;
pub mod utils;

// Re-export commonly used types and traits
pub use config::{Config, ConfigManager};
pub use context::{FileMeta, FileRef, FileSelector, FileSummarizer};
pub use llm::{Chat, ChatAnswer, ChatProvider, ChatProviderFactory, LlmError, OpenAiClient};
pub use session::{Session, SessionDeps};
pub use state::{Observable, PersistentObservable};
pub use ui::{Inbound, Notifier, Outbound};
pub use utils::errors::{AppError, ConfigError};

/// The main result type used throughout the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "gpt-with-context";
