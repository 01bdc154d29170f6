//! Trait boundaries for the collaborators the core consumes but does not own
//! (specification §6). The chat-protocol integration, the real message-history
//! store, and the dangerous-pattern static analyser are explicitly out of
//! scope (§1); these traits exist so the orchestrator has something to call,
//! and the default implementations here exist only so the crate is
//! self-contained for its own tests and examples.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Keyed record store for recent chat messages and the bot's own reply mapping.
///
/// Keyed by `(chat, msg_id)`; cleanup is opportunistic, not guaranteed.
pub trait MessageStore: Send + Sync {
    /// Record a message's text under `(chat, msg_id)`.
    fn store(&self, chat: &str, msg_id: &str, text: &str);
    /// Find the stored `(id, text)` for a message matching `match_text` in `chat`.
    fn find_target(&self, chat: &str, match_text: &str) -> Option<(String, String)>;
    /// Find a previously-remembered bot reply id for `target_id` in `chat`.
    fn find_bot_reply(&self, chat: &str, target_id: &str) -> Option<String>;
    /// Remember that `bot_id` is the bot's reply to `target_id` in `chat`.
    fn remember_bot_reply(&self, chat: &str, target_id: &str, bot_id: &str);
    /// Opportunistically drop entries older than `cutoff` (monotonic age in milliseconds).
    fn cleanup_older_than(&self, cutoff_ms: u64);
}

struct StoredMessage {
    text: String,
    age_ms: u64,
}

/// A simple in-memory [`MessageStore`] keyed by `(chat, msg_id)`.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<HashMap<(String, String), StoredMessage>>,
    bot_replies: Mutex<HashMap<(String, String), String>>,
}

impl InMemoryMessageStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn store(&self, chat: &str, msg_id: &str, text: &str) {
        self.messages
            .lock()
            .insert((chat.to_string(), msg_id.to_string()), StoredMessage { text: text.to_string(), age_ms: 0 });
    }

    fn find_target(&self, chat: &str, match_text: &str) -> Option<(String, String)> {
        self.messages
            .lock()
            .iter()
            .find(|((c, _), msg)| c == chat && msg.text.contains(match_text))
            .map(|((_, id), msg)| (id.clone(), msg.text.clone()))
    }

    fn find_bot_reply(&self, chat: &str, target_id: &str) -> Option<String> {
        self.bot_replies.lock().get(&(chat.to_string(), target_id.to_string())).cloned()
    }

    fn remember_bot_reply(&self, chat: &str, target_id: &str, bot_id: &str) {
        self.bot_replies.lock().insert((chat.to_string(), target_id.to_string()), bot_id.to_string());
    }

    fn cleanup_older_than(&self, cutoff_ms: u64) {
        self.messages.lock().retain(|_, msg| msg.age_ms <= cutoff_ms);
    }
}

/// Sends or edits a user-visible reply. The orchestrator never inspects the return value.
pub trait ReplySender: Send + Sync {
    /// Send a new message, or edit an existing one if `is_edit` is set.
    fn send_or_edit(&self, target_id: &str, text: &str, is_edit: bool);
}

/// A [`ReplySender`] that records calls instead of sending anything, for tests.
#[derive(Default)]
pub struct RecordingReplySender {
    /// Every `(target_id, text, is_edit)` triple observed, in call order.
    pub sent: Mutex<Vec<(String, String, bool)>>,
}

impl RecordingReplySender {
    /// Construct a sender with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplySender for RecordingReplySender {
    fn send_or_edit(&self, target_id: &str, text: &str, is_edit: bool) {
        self.sent.lock().push((target_id.to_string(), text.to_string(), is_edit));
    }
}

/// A single issue raised by the dangerous-pattern advisor.
#[derive(Debug, Clone)]
pub struct PatternIssue {
    /// Human-readable description of the concerning construct.
    pub description: String,
}

/// Outcome of running the advisor's detector over a pattern.
#[derive(Debug, Clone)]
pub struct PatternDetection {
    /// Whether the advisor flagged the pattern at all.
    pub detected: bool,
    /// A rough severity score; higher is more concerning.
    pub score: u32,
    /// The specific issues found.
    pub issues: Vec<PatternIssue>,
}

/// Pure static analysis over a regex pattern, invoked upstream of submission.
///
/// The real analyser (catastrophic-backtracking detection, etc.) is
/// explicitly out of scope per the specification's §1; this trait exists so
/// the orchestrator has a boundary to call through, and
/// [`HeuristicPatternAdvisor`] is a deliberately conservative,
/// non-authoritative stand-in.
pub trait PatternAdvisor: Send + Sync {
    /// Whether `pattern` is classifiable as "simple" (no need to run the detector).
    fn is_simple(&self, pattern: &str) -> bool;
    /// Run the detector over a non-simple pattern.
    fn detect(&self, pattern: &str) -> PatternDetection;
    /// Render a detection result as a user-facing warning string.
    fn format_warning(&self, detection: &PatternDetection) -> String;
}

/// A conservative heuristic advisor: flags nested quantifiers and nested
/// groups as "simple" disqualifiers, without claiming to prove anything
/// about backtracking complexity.
pub struct HeuristicPatternAdvisor;

impl PatternAdvisor for HeuristicPatternAdvisor {
    fn is_simple(&self, pattern: &str) -> bool {
        !self.detect(pattern).detected
    }

    fn detect(&self, pattern: &str) -> PatternDetection {
        let mut issues = Vec::new();
        let mut depth = 0i32;
        let mut max_depth = 0i32;
        let mut prev_was_quantifier = false;
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '(' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                ')' => depth -= 1,
                '+' | '*' => {
                    if prev_was_quantifier {
                        issues.push(PatternIssue { description: "adjacent quantifiers may backtrack catastrophically".into() });
                    }
                    prev_was_quantifier = true;
                    continue;
                }
                _ => {}
            }
            prev_was_quantifier = false;
        }
        if max_depth >= 3 {
            issues.push(PatternIssue { description: format!("deeply nested groups (depth {max_depth})") });
        }
        let score = issues.len() as u32 * 10 + max_depth.max(0) as u32;
        PatternDetection { detected: !issues.is_empty(), score, issues }
    }

    fn format_warning(&self, detection: &PatternDetection) -> String {
        if detection.issues.is_empty() {
            return String::new();
        }
        let descriptions: Vec<_> = detection.issues.iter().map(|i| i.description.as_str()).collect();
        format!("pattern may be unsafe (score {}): {}", detection.score, descriptions.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_store_round_trips() {
        let store = InMemoryMessageStore::new();
        store.store("chat1", "msg1", "hello world");
        let found = store.find_target("chat1", "hello").unwrap();
        assert_eq!(found.0, "msg1");
        store.remember_bot_reply("chat1", "msg1", "bot-reply-1");
        assert_eq!(store.find_bot_reply("chat1", "msg1").unwrap(), "bot-reply-1");
    }

    #[test]
    fn recording_reply_sender_captures_calls() {
        let sender = RecordingReplySender::new();
        sender.send_or_edit("t1", "hi", false);
        sender.send_or_edit("t1", "hi again", true);
        let sent = sender.sent.lock();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].2);
    }

    #[test]
    fn heuristic_advisor_flags_nested_quantifiers() {
        let advisor = HeuristicPatternAdvisor;
        assert!(!advisor.is_simple("(a+)+$"));
    }

    #[test]
    fn heuristic_advisor_treats_plain_pattern_as_simple() {
        let advisor = HeuristicPatternAdvisor;
        assert!(advisor.is_simple("hello"));
    }
}
