//! Simple console-based chat interface without frames

use super::events::ConsoleCommand;
use super::messages::Inbound;
use crate::context::{FileMeta, MetaTotals};
use crate::llm::Chat;
use crate::session::Session;
use crate::state::KeySource;
use crate::Result;
use colored::*;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Render the selection as one line per file followed by the totals
pub fn format_selection(metas: &[FileMeta]) -> String {
    let mut out = String::new();
    for meta in metas {
        out.push_str(&format!(
            "{:>7} {:>9}  {}\n",
            meta.loc_count, meta.char_count, meta.file
        ));
    }
    out.push_str(&format_totals(&MetaTotals::of(metas)));
    out
}

/// Panel counters as a single line
pub fn format_totals(totals: &MetaTotals) -> String {
    format!(
        "{} files, {} lines, {} characters",
        totals.files, totals.loc_count, totals.char_count
    )
}

/// Prints the part of a streamed answer that has not been printed yet
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print(&mut self, chat: &Chat) {
        let text = &chat.answer.text;
        if text.len() < self.printed || !text.is_char_boundary(self.printed) {
            self.printed = 0;
        }
        print!("{}", &text[self.printed..]);
        let _ = io::stdout().flush();
        self.printed = text.len();
    }
}

pub struct ConsoleChat {
    session: Arc<Session>,
}

impl ConsoleChat {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let printer = Arc::new(Mutex::new(StreamPrinter::default()));
        let stream_printer = Arc::clone(&printer);
        let subscription = self.session.chat().subscribe(move |chat: &Option<Arc<Chat>>| {
            if let Some(chat) = chat {
                stream_printer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .print(chat);
            }
        });

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{} ", "›".bright_blue().bold());
            io::stdout().flush()?;

            let Some(input) = lines.next_line().await? else {
                break;
            };

            match ConsoleCommand::parse(&input) {
                ConsoleCommand::Empty => continue,
                ConsoleCommand::Exit => {
                    println!("{}", "Goodbye!".bright_yellow());
                    break;
                }
                ConsoleCommand::Help => self.show_help(),
                ConsoleCommand::ShowFiles => self.show_files(),
                ConsoleCommand::KeyStatus => self.show_key_status().await,
                ConsoleCommand::Unknown(command) => {
                    println!("{} {}", "Unknown command:".bright_red(), command);
                    println!("{}", "Type 'help' for available commands.".dimmed());
                }
                ConsoleCommand::Message(message @ Inbound::Ask { .. }) => {
                    *printer.lock().unwrap_or_else(PoisonError::into_inner) = StreamPrinter::default();
                    println!();
                    self.session.handle(message).await;
                    println!();
                }
                ConsoleCommand::Message(message) => {
                    let updates_selection = matches!(
                        message,
                        Inbound::SetInclude { .. } | Inbound::SetExclude { .. } | Inbound::Refresh
                    );
                    self.session.handle(message).await;
                    if updates_selection {
                        let metas = self.session.metas().get_value();
                        println!("{}", format_totals(&MetaTotals::of(&metas)).bright_cyan());
                    }
                }
            }

            println!();
        }

        self.session.chat().unsubscribe(subscription);
        Ok(())
    }

    fn print_banner(&self) {
        println!("{}", "GPT with Context".bright_green().bold());
        println!(
            "{} {}",
            "Workspace:".dimmed(),
            self.session.root().display().to_string().dimmed()
        );
        println!(
            "{} {}",
            "Include:".dimmed(),
            self.session.include_text().get_value().bright_white()
        );
        println!(
            "{} {}",
            "Exclude:".dimmed(),
            self.session.exclude_text().get_value().bright_white()
        );
        println!("{}", "Ask a question, or type 'help' for commands. Use 'exit' to quit.".dimmed());
        println!();
    }

    fn show_files(&self) {
        let metas = self.session.metas().get_value();
        if metas.is_empty() {
            println!("{}", "No files selected. Use /include to select files.".dimmed());
            return;
        }
        print!("{}", format_selection(&metas));
        println!();
    }

    async fn show_key_status(&self) {
        match self.session.keys().resolve().await {
            Ok(Some((_, KeySource::Environment))) => println!(
                "{} from ${}",
                "API key set".bright_green(),
                self.session.keys().env_var()
            ),
            Ok(Some((_, KeySource::SecretStore))) => {
                println!("{} in the secret store", "API key set".bright_green())
            }
            Ok(None) => println!("{}", "OpenAI API key is not set".bright_yellow()),
            Err(e) => println!("{} {}", "Error:".bright_red(), e),
        }
    }

    fn show_help(&self) {
        println!();
        println!("{}", "Available commands:".bright_cyan().bold());
        println!("  {} - Set the include patterns (comma separated)", "/include <patterns>".bright_yellow());
        println!("  {} - Set the exclude patterns (comma separated)", "/exclude <patterns>".bright_yellow());
        println!("  {} - List the selected files with line and character counts", "/files".bright_yellow());
        println!("  {} - Search the workspace again", "/refresh".bright_yellow());
        println!("  {} - Store the OpenAI API key", "/key <value>".bright_yellow());
        println!("  {} - Remove the stored API key", "/key clear".bright_yellow());
        println!("  {} - Show where the API key comes from", "/key".bright_yellow());
        println!("  {} - Exit the application", "exit/quit".bright_yellow());
        println!("  {} - Show this help message", "help".bright_yellow());
        println!();
        println!("{}", "Anything else is sent as a question about the selected files.".dimmed());
    }
}
