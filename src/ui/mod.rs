//! Front-end facing pieces: the message protocol, notifications and the console

pub mod console_chat;
pub mod events;
pub mod messages;

pub use console_chat::{format_selection, format_totals, ConsoleChat, StreamPrinter};
pub use events::ConsoleCommand;
pub use messages::{Inbound, Outbound};

use colored::*;
use std::sync::{Mutex, PoisonError};

/// Sink for user-facing notifications
pub trait Notifier: Send + Sync {
    fn show_error(&self, message: &str);
    fn show_info(&self, message: &str);
}

/// Prints notifications to the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show_error(&self, message: &str) {
        eprintln!("{} {}", "✗".bright_red().bold(), message.bright_red());
    }

    fn show_info(&self, message: &str) {
        println!("{} {}", "ℹ".bright_blue(), message);
    }
}

/// Keeps every notification as an `Outbound` message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Outbound>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Outbound> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Outbound::Error { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Outbound::Info { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, message: Outbound) {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).push(message);
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        self.push(Outbound::Error {
            message: message.to_string(),
        });
    }

    fn show_info(&self, message: &str) {
        self.push(Outbound::Info {
            message: message.to_string(),
        });
    }
}
