//! One conversational turn, end to end
//!
//! streak -> classify -> mood entry -> conversation (created on first
//! message) -> user message -> reply -> assistant message

use chrono::NaiveDate;

use crate::classifier::{detect_emotion, EmotionClassifier};
use crate::db::{Conversation, Database, Role, DEFAULT_MOOD_HISTORY_LIMIT};
use crate::error::{CoachError, Result};
use crate::generator::{Reply, ResponseGenerator};
use crate::logging;
use crate::mood::{self, MoodSummary};
use crate::prompts;
use crate::session::SessionContext;

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub emotion: String,
    pub confidence: Option<f64>,
    pub notice: Option<String>,
    pub reply: Reply,
    pub conversation_id: i64,
    pub new_conversation: bool,
    pub streak: i64,
    pub milestone: Option<String>,
}

pub struct Coach {
    db: Database,
    classifier: Box<dyn EmotionClassifier>,
    generator: ResponseGenerator,
}

impl Coach {
    pub fn new(db: Database, classifier: Box<dyn EmotionClassifier>, generator: ResponseGenerator) -> Self {
        Self { db, classifier, generator }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn send_message(
        &self,
        session: &mut SessionContext,
        text: &str,
        today: NaiveDate,
    ) -> Result<TurnOutcome> {
        let user = session.require_user()?.clone();
        if text.trim().is_empty() {
            return Err(CoachError::InvalidInput("message must not be empty".into()));
        }

        session.record_activity(&self.db, today)?;

        let detection = detect_emotion(self.classifier.as_ref(), text).await;
        self.db.add_mood_entry(user.id, &detection.label)?;

        let new_conversation = session.needs_new_conversation();
        if new_conversation {
            let title = prompts::conversation_title(&detection.label, text, today);
            let conversation_id = self.db.create_conversation(user.id, &title)?;
            session.begin_conversation(conversation_id);
            logging::log_conversation(Some(conversation_id), &format!("Created '{}'", title));
        }
        let conversation_id = session
            .conversation_id()
            .ok_or_else(|| CoachError::InvalidInput("no active conversation".into()))?;

        self.db.add_message(conversation_id, Role::User, text, Some(&detection.label))?;
        session.push_message(Role::User, text);

        let reply = self
            .generator
            .respond(text, &detection.label, &user.name, Some(conversation_id))
            .await;

        self.db.add_message(conversation_id, Role::Assistant, &reply.text, None)?;
        session.push_message(Role::Assistant, &reply.text);
        logging::log_store(Some(conversation_id), &format!("Stored turn ({:?} reply)", reply.kind));

        Ok(TurnOutcome {
            emotion: detection.label,
            confidence: detection.confidence,
            notice: detection.notice,
            reply,
            conversation_id,
            new_conversation,
            streak: session.streak(),
            milestone: prompts::milestone_message(&user.name, session.streak()),
        })
    }

    pub fn conversations(&self, session: &SessionContext) -> Result<Vec<Conversation>> {
        let user = session.require_user()?;
        self.db.get_user_conversations(user.id)
    }

    pub fn mood_summary(&self, session: &SessionContext) -> Result<MoodSummary> {
        let user = session.require_user()?;
        let history = self.db.get_user_mood_history(user.id, DEFAULT_MOOD_HISTORY_LIMIT)?;
        Ok(mood::summarize(&history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, EmotionClassifier};
    use crate::generator::tests::FakeGenerator;
    use crate::generator::ReplyKind;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct FixedClassifier(&'static str, f64);

    #[async_trait]
    impl EmotionClassifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification> {
            Ok(Classification {
                label: self.0.to_string(),
                confidence: self.1,
                probabilities: BTreeMap::new(),
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn coach_with(dir: &TempDir, label: &'static str, reply: &str) -> (Coach, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        let db = Database::open(dir.path().join("coach.db")).unwrap();
        let (fake, calls) = FakeGenerator::replying(reply);
        let coach = Coach::new(
            db,
            Box::new(FixedClassifier(label, 0.9)),
            ResponseGenerator::new(Box::new(fake)),
        );
        (coach, calls)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[tokio::test]
    async fn test_requires_login() {
        let dir = TempDir::new().unwrap();
        let (coach, calls) = coach_with(&dir, "joy", "hi");
        let mut session = SessionContext::new();

        let result = coach.send_message(&mut session, "hello", day(1)).await;
        assert!(matches!(result, Err(CoachError::NotIdentified)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_message_creates_conversation() {
        let dir = TempDir::new().unwrap();
        let (coach, _calls) = coach_with(&dir, "joy", "That's wonderful to hear.");
        let mut session = SessionContext::new();
        session.login(coach.database(), "Ada").unwrap();
        session.start_new_session().unwrap();

        let first = coach.send_message(&mut session, "I got the job!", day(1)).await.unwrap();
        assert!(first.new_conversation);
        assert_eq!(first.emotion, "Joy");
        assert_eq!(first.reply.kind, ReplyKind::Generated);
        assert_eq!(first.streak, 1);

        let second = coach.send_message(&mut session, "Still buzzing", day(1)).await.unwrap();
        assert!(!second.new_conversation);
        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(second.streak, 1);

        let conversations = coach.conversations(&session).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].title, "Joy Session (Jun 01) - I got the job!...");

        let stored = coach.database().get_conversation_messages(first.conversation_id).unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(stored[0].emotion.as_deref(), Some("Joy"));
        assert_eq!(stored[1].emotion, None);
        assert_eq!(session.messages().len(), 4);

        let user = coach.database().get_user("Ada").unwrap().unwrap();
        assert_eq!(user.total_sessions, 1);
    }

    #[tokio::test]
    async fn test_crisis_message_is_stored_without_generation() {
        let dir = TempDir::new().unwrap();
        let (coach, calls) = coach_with(&dir, "sadness", "unused");
        let mut session = SessionContext::new();
        session.login(coach.database(), "Ada").unwrap();

        let outcome = coach
            .send_message(&mut session, "I want to end my life", day(2))
            .await
            .unwrap();

        assert_eq!(outcome.reply.kind, ReplyKind::Crisis);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let stored = coach.database().get_conversation_messages(outcome.conversation_id).unwrap();
        assert_eq!(stored[1].content, prompts::crisis_reply("Ada"));
    }

    #[tokio::test]
    async fn test_every_message_records_mood() {
        let dir = TempDir::new().unwrap();
        let (coach, _calls) = coach_with(&dir, "fear", "ok");
        let mut session = SessionContext::new();
        session.login(coach.database(), "Ada").unwrap();

        coach.send_message(&mut session, "one", day(1)).await.unwrap();
        session.start_new_session().unwrap();
        coach.send_message(&mut session, "two", day(2)).await.unwrap();

        let summary = coach.mood_summary(&session).unwrap();
        assert_eq!(summary.total_entries, 2);
        assert_eq!(summary.counts["Fear"], 2);
        assert_eq!(coach.conversations(&session).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_milestone_on_fifth_day() {
        let dir = TempDir::new().unwrap();
        let (coach, _calls) = coach_with(&dir, "joy", "ok");
        let mut session = SessionContext::new();
        session.login(coach.database(), "Ada").unwrap();

        for d in 1..=4 {
            let outcome = coach.send_message(&mut session, "hello", day(d)).await.unwrap();
            assert!(outcome.milestone.is_none());
        }
        let fifth = coach.send_message(&mut session, "hello", day(5)).await.unwrap();
        assert!(fifth.milestone.unwrap().contains("5-day"));
    }

    #[tokio::test]
    async fn test_rejects_blank_message() {
        let dir = TempDir::new().unwrap();
        let (coach, calls) = coach_with(&dir, "joy", "ok");
        let mut session = SessionContext::new();
        session.login(coach.database(), "Ada").unwrap();

        let result = coach.send_message(&mut session, "   ", day(1)).await;
        assert!(matches!(result, Err(CoachError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.streak(), 0);
    }
}
