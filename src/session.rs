//! Per-session state
//!
//! One [`SessionContext`] exists per interactive session and is passed to
//! every handler. It moves through these states:
//!
//! - Anonymous: no user
//! - Identified: user known, no conversation (`ConversationState::Idle`)
//! - Awaiting first message: new session requested; the conversation row
//!   is only created when the first message arrives
//! - Active: messages go to an existing conversation
//!
//! Logout drops back to Anonymous and clears everything.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Database, Role};
use crate::error::{CoachError, Result};
use crate::logging;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingFirstMessage,
    Active(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Existing user found by name
    Returning,
    /// No match; a new user was created
    Created,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    session_id: Uuid,
    user: Option<ActiveUser>,
    conversation: ConversationState,
    messages: Vec<ChatEntry>,
    streak: i64,
    last_session_date: Option<NaiveDate>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user: None,
            conversation: ConversationState::Idle,
            messages: Vec::new(),
            streak: 0,
            last_session_date: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn user(&self) -> Option<&ActiveUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&ActiveUser> {
        self.user.as_ref().ok_or(CoachError::NotIdentified)
    }

    pub fn is_identified(&self) -> bool {
        self.user.is_some()
    }

    pub fn conversation_state(&self) -> ConversationState {
        self.conversation
    }

    pub fn conversation_id(&self) -> Option<i64> {
        match self.conversation {
            ConversationState::Active(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_awaiting_first_message(&self) -> bool {
        self.conversation == ConversationState::AwaitingFirstMessage
    }

    pub fn needs_new_conversation(&self) -> bool {
        !matches!(self.conversation, ConversationState::Active(_))
    }

    pub fn messages(&self) -> &[ChatEntry] {
        &self.messages
    }

    pub fn streak(&self) -> i64 {
        self.streak
    }

    pub fn last_session_date(&self) -> Option<NaiveDate> {
        self.last_session_date
    }

    /// Look the user up by name, creating them if there is no match.
    pub fn login(&mut self, db: &Database, name: &str) -> Result<LoginOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoachError::InvalidInput("name must not be empty".into()));
        }

        if self.user.is_some() {
            self.logout();
        }

        let outcome = match db.get_user(name)? {
            Some(record) => {
                self.user = Some(ActiveUser { id: record.id, name: record.name });
                self.streak = record.streak;
                self.last_session_date = record.last_session_date;
                LoginOutcome::Returning
            }
            None => {
                let id = db.create_user(name)?;
                self.user = Some(ActiveUser { id, name: name.to_string() });
                self.streak = 0;
                self.last_session_date = None;
                LoginOutcome::Created
            }
        };

        logging::log_conversation(None, &format!(
            "session={} login {:?} as '{}'",
            self.session_id, outcome, name
        ));
        Ok(outcome)
    }

    pub fn logout(&mut self) {
        logging::log_conversation(self.conversation_id(), &format!("session={} logout", self.session_id));
        *self = Self::new();
    }

    /// Clear the current conversation; the next message opens a new one.
    pub fn start_new_session(&mut self) -> Result<()> {
        self.require_user()?;
        self.conversation = ConversationState::AwaitingFirstMessage;
        self.messages.clear();
        logging::log_conversation(None, &format!("session={} awaiting first message", self.session_id));
        Ok(())
    }

    /// Switch to a stored conversation owned by the current user.
    pub fn open_conversation(&mut self, db: &Database, conversation_id: i64) -> Result<()> {
        let user_id = self.require_user()?.id;

        let conversation = db
            .get_conversation(conversation_id)?
            .filter(|c| c.user_id == user_id)
            .ok_or(CoachError::ConversationNotFound(conversation_id))?;

        self.messages = db
            .get_conversation_messages(conversation.id)?
            .into_iter()
            .map(|m| ChatEntry { role: m.role, content: m.content })
            .collect();
        self.conversation = ConversationState::Active(conversation.id);

        logging::log_conversation(Some(conversation.id), &format!(
            "Opened with {} messages",
            self.messages.len()
        ));
        Ok(())
    }

    /// Mark a freshly created conversation as active.
    pub fn begin_conversation(&mut self, conversation_id: i64) {
        self.conversation = ConversationState::Active(conversation_id);
        self.messages.clear();
    }

    pub fn push_message(&mut self, role: Role, content: &str) {
        self.messages.push(ChatEntry { role, content: content.to_string() });
    }

    /// Count `today` toward the streak if it differs from the last recorded
    /// day. Gaps between days do not reset the count. Returns whether the
    /// streak moved.
    pub fn record_activity(&mut self, db: &Database, today: NaiveDate) -> Result<bool> {
        let user_id = self.require_user()?.id;

        if self.last_session_date == Some(today) {
            return Ok(false);
        }

        self.streak += 1;
        self.last_session_date = Some(today);
        db.update_user_streak(user_id, self.streak, today)?;
        Ok(true)
    }
}
