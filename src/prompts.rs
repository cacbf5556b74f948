// Coaching prompts, crisis text and per-emotion tables

use chrono::NaiveDate;

use crate::emotion::Emotion;

pub const CRISIS_RESOURCES: &str = r#"**Immediate Help Available:**
- National Suicide Prevention Lifeline: 988 (US)
- Crisis Text Line: Text HOME to 741741 (US)
- International Association for Suicide Prevention: [Find local hotlines](https://findahelpline.com), worldwide."#;

pub const CRISIS_KEYWORDS: [&str; 5] = [
    "kill myself",
    "end my life",
    "suicide",
    "self-harm",
    "want to die",
];

const TITLE_PREVIEW_CHARS: usize = 25;

/// Case-insensitive substring match against the crisis phrase list.
pub fn contains_crisis_language(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CRISIS_KEYWORDS.iter().any(|k| lowered.contains(k))
}

pub fn crisis_reply(user_name: &str) -> String {
    format!(
        "I hear you're in deep pain right now, {}. Please know you're not alone and there is help available.\n\n\
         **Immediate Help:**\n{}\n\n\
         Would you like help finding professional support near you?",
        user_name, CRISIS_RESOURCES
    )
}

/// Coaching tone for an emotion label.
pub fn tone_for(label: &str) -> &'static str {
    match Emotion::from_label(label) {
        Some(Emotion::Joy) => "energetic and celebratory",
        Some(Emotion::Sadness) => "gentle and comforting",
        Some(Emotion::Anger) => "calm and grounding",
        Some(Emotion::Fear) => "reassuring and practical",
        Some(Emotion::Disgust) => "curious and non-judgmental",
        Some(Emotion::Surprise) => "present and observant",
        Some(Emotion::Love) => "warm and affectionate",
        Some(Emotion::Neutral) => "attentive and reflective",
        None => "compassionate and supportive",
    }
}

/// Short practice matched to the detected emotion.
pub fn personalized_exercise(label: &str, user_name: &str) -> String {
    match Emotion::from_label(label) {
        Some(Emotion::Joy) => format!("🌞 {}, amplify this joy by sharing it with someone or journaling about this moment.", user_name),
        Some(Emotion::Sadness) => format!("💙 {}, try the 'three gratitudes' practice - write down three small things you appreciate.", user_name),
        Some(Emotion::Anger) => format!("🌊 {}, practice the 'STOP' technique: Stop, Take a breath, Observe, Proceed mindfully.", user_name),
        Some(Emotion::Fear) => format!("🛡️ {}, try 'fear setting': Write down the worst case, best case, and most likely scenario.", user_name),
        Some(Emotion::Disgust) => format!("🔄 {}, practice cognitive reframing - what can this reaction teach you?", user_name),
        Some(Emotion::Surprise) => format!("🎯 {}, take a mindful pause and observe your bodily sensations without judgment.", user_name),
        Some(Emotion::Love) => format!("❤️ {}, practice loving-kindness meditation by sending warm wishes to yourself and others.", user_name),
        Some(Emotion::Neutral) => format!("🧘 {}, try a brief body scan meditation to reconnect with the present moment.", user_name),
        None => format!("🧠 {}, try 5 minutes of mindful breathing.", user_name),
    }
}

pub fn build_coach_prompt(user_text: &str, label: &str, user_name: &str) -> String {
    format!(
        r#"You are a mental health coach with a {tone} tone. The user {name} is feeling {emotion}.

User's message: "{text}"

Respond with this structure:
1. **Validation** (1 sentence acknowledging their emotion)
2. **Understanding** (brief reflection of what they might be experiencing)
3. **Coping Strategies** (2-3 practical, actionable suggestions)
4. **Cognitive Reframe** (one helpful perspective shift)
5. **Immediate Exercise** (one 30-second grounding practice)

Keep it conversational, personal, and focused on their specific emotion. Use their name naturally."#,
        tone = tone_for(label),
        name = user_name,
        emotion = label.to_lowercase(),
        text = user_text,
    )
}

pub fn no_text_reply(user_name: &str) -> String {
    format!(
        "⚠️ I'm here for you {}, but I'm having trouble responding right now. Please try again.",
        user_name
    )
}

pub fn failure_reply(user_name: &str, error: &str) -> String {
    format!("⚠️ Sorry {}, I couldn't generate a response: {}", user_name, error)
}

/// "{Emotion} Session ({Mon DD}) - {first 25 chars}..."
pub fn conversation_title(label: &str, user_text: &str, date: NaiveDate) -> String {
    let preview: String = user_text.chars().take(TITLE_PREVIEW_CHARS).collect();
    format!("{} Session ({}) - {}...", label, date.format("%b %d"), preview)
}

pub fn milestone_message(user_name: &str, streak: i64) -> Option<String> {
    if streak > 0 && streak % 5 == 0 {
        Some(format!(
            "🌟 Amazing commitment, {}! You're on a {}-day self-care streak!",
            user_name, streak
        ))
    } else {
        None
    }
}
