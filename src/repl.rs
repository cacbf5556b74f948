//! Interactive terminal session
//!
//! Plain lines are sent to the coach; slash commands drive the session
//! state (new session, history, switching conversations, logout).

use chrono::Local;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::coach::{Coach, TurnOutcome};
use crate::db::Role;
use crate::error::{CoachError, Result};
use crate::prompts::CRISIS_RESOURCES;
use crate::session::{LoginOutcome, SessionContext};

const HELP: &str = "Commands:
  /new          start a new session
  /history      list your conversations
  /open <id>    switch to a stored conversation
  /mood         mood summary for your last 30 entries
  /streak       show your activity streak
  /logout       log out
  /help         show this help and crisis resources
  /quit         exit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Message(String),
    New,
    History,
    Open(i64),
    Mood,
    Streak,
    Logout,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if !line.starts_with('/') {
        return Command::Message(line.to_string());
    }

    let mut parts = line.split_whitespace();
    match (parts.next().unwrap_or_default(), parts.next()) {
        ("/new", _) => Command::New,
        ("/history", _) => Command::History,
        ("/open", Some(id)) => match id.parse() {
            Ok(id) => Command::Open(id),
            Err(_) => Command::Unknown(line.to_string()),
        },
        ("/mood", _) => Command::Mood,
        ("/streak", _) => Command::Streak,
        ("/logout", _) => Command::Logout,
        ("/help", _) => Command::Help,
        ("/quit", _) | ("/exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

pub struct ChatRepl {
    editor: DefaultEditor,
    coach: Coach,
    session: SessionContext,
}

impl ChatRepl {
    pub fn new(coach: Coach) -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
            coach,
            session: SessionContext::new(),
        })
    }

    /// Read a line; `None` on Ctrl+C / Ctrl+D.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Some(line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn login(&mut self, name: &str) -> Result<()> {
        match self.session.login(self.coach.database(), name)? {
            LoginOutcome::Returning => println!("Welcome back, {}! 🌟", name.trim()),
            LoginOutcome::Created => println!("Welcome, {}! 🌻", name.trim()),
        }
        println!("🔥 {} day streak", self.session.streak());
        println!("💬 Share how you're feeling to begin your mental health journey");
        Ok(())
    }

    /// Ask for a name until one is given. Returns false if the user quit.
    fn prompt_login(&mut self) -> Result<bool> {
        loop {
            let Some(line) = self.read_line("What's your name? ")? else {
                return Ok(false);
            };
            match self.login(&line) {
                Ok(()) => return Ok(true),
                Err(CoachError::InvalidInput(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn run(&mut self, name: Option<String>) -> Result<()> {
        println!("🧠 Emotion-Aware AI Mental Health Coach (/help for commands)");

        match name {
            Some(name) => self.login(&name)?,
            None => {
                if !self.prompt_login()? {
                    return Ok(());
                }
            }
        }

        loop {
            let prompt = if self.session.is_awaiting_first_message() {
                "(new session) you> "
            } else {
                "you> "
            };
            let Some(line) = self.read_line(prompt)? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            match parse_command(&line) {
                Command::Message(text) => {
                    let today = Local::now().date_naive();
                    let outcome = self.coach.send_message(&mut self.session, &text, today).await?;
                    render_turn(&outcome);
                }
                Command::New => {
                    self.session.start_new_session()?;
                    println!("Please share how you're feeling to start your session...");
                }
                Command::History => self.show_history()?,
                Command::Open(id) => match self.session.open_conversation(self.coach.database(), id) {
                    Ok(()) => self.show_transcript(),
                    Err(CoachError::ConversationNotFound(id)) => println!("No conversation {} found.", id),
                    Err(e) => return Err(e),
                },
                Command::Mood => self.show_mood()?,
                Command::Streak => println!("🔥 {} day streak", self.session.streak()),
                Command::Logout => {
                    self.session.logout();
                    println!("Logged out.");
                    if !self.prompt_login()? {
                        break;
                    }
                }
                Command::Help => {
                    println!("{}\n\n{}", HELP, CRISIS_RESOURCES);
                }
                Command::Quit => break,
                Command::Unknown(cmd) => println!("Unknown command: {} (try /help)", cmd),
            }
        }

        Ok(())
    }

    fn show_history(&self) -> Result<()> {
        let conversations = self.coach.conversations(&self.session)?;
        if conversations.is_empty() {
            println!("No conversations yet.");
        }
        for conversation in conversations {
            let marker = if self.session.conversation_id() == Some(conversation.id) { "*" } else { " " };
            println!("{} [{}] {}", marker, conversation.id, conversation.title);
        }
        Ok(())
    }

    fn show_transcript(&self) {
        for entry in self.session.messages() {
            let speaker = match entry.role {
                Role::User => "you",
                Role::Assistant => "coach",
            };
            println!("{}> {}\n", speaker, entry.content);
        }
    }

    fn show_mood(&self) -> Result<()> {
        let summary = self.coach.mood_summary(&self.session)?;
        if summary.total_entries == 0 {
            println!("No mood entries yet.");
            return Ok(());
        }

        println!("Mood Tracker ({} entries)", summary.total_entries);
        for (emotion, count) in &summary.counts {
            println!("  {:<10} {}", emotion, "█".repeat(*count));
        }
        for day in &summary.daily {
            println!("  {}  {} ({})", day.date, day.dominant, day.entries);
        }
        Ok(())
    }
}

fn render_turn(outcome: &TurnOutcome) {
    if let Some(notice) = &outcome.notice {
        println!("ℹ️  {}", notice);
    }
    println!("[{}]", outcome.emotion);
    println!("\ncoach> {}\n", outcome.reply.text);
    if let Some(milestone) = &outcome.milestone {
        println!("🎉 {}", milestone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("  hello there "), Command::Message("hello there".into()));
        assert_eq!(parse_command("/new"), Command::New);
        assert_eq!(parse_command("/open 12"), Command::Open(12));
        assert_eq!(parse_command("/open twelve"), Command::Unknown("/open twelve".into()));
        assert_eq!(parse_command("/open"), Command::Unknown("/open".into()));
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("/dance"), Command::Unknown("/dance".into()));
    }
}
