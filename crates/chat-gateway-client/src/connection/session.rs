//! Session state
//!
//! Everything the client must remember to resume a dropped session.

use serde::Serialize;

use crate::protocol::ResumePayload;

/// Outcome of observing a dispatch sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Newer than anything seen; the session now points at it
    Advanced,
    /// Already seen (replay or out of order); the dispatch must be dropped
    Stale,
}

/// Resumable session data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Session ID from READY
    pub session_id: Option<String>,
    /// Last dispatch sequence number seen; 0 before the first dispatch
    pub sequence: u64,
    /// Gateway URL to use when resuming
    pub resume_url: Option<String>,
    /// Heartbeat interval from the most recent Hello
    pub heartbeat_interval_ms: u64,
    /// Whether the next handshake should be a Resume
    pub resumable: bool,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume is possible: flagged resumable with a known session and sequence
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.resumable && self.session_id.is_some() && self.sequence > 0
    }

    /// Record a new session from READY
    pub fn establish(&mut self, session_id: String, resume_url: Option<String>) {
        self.session_id = Some(session_id);
        self.resume_url = resume_url;
        self.resumable = true;
    }

    /// Check a dispatch sequence number and advance to it if newer
    pub fn observe_sequence(&mut self, seq: u64) -> SequenceCheck {
        if seq > self.sequence {
            self.sequence = seq;
            SequenceCheck::Advanced
        } else {
            SequenceCheck::Stale
        }
    }

    /// Sequence to echo in heartbeats; `None` until a dispatch has been seen
    #[must_use]
    pub fn heartbeat_sequence(&self) -> Option<u64> {
        (self.sequence > 0).then_some(self.sequence)
    }

    /// Forget the session after a non-resumable invalidation
    ///
    /// The heartbeat interval belongs to the connection, not the session, and
    /// is kept.
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.sequence = 0;
        self.resume_url = None;
        self.resumable = false;
    }

    /// Resume payload for this session, if it can be resumed
    #[must_use]
    pub fn resume_payload(&self, token: &str) -> Option<ResumePayload> {
        if !self.can_resume() {
            return None;
        }
        self.session_id.as_ref().map(|session_id| ResumePayload {
            token: token.to_string(),
            session_id: session_id.clone(),
            seq: self.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established(seq: u64) -> SessionState {
        let mut session = SessionState::new();
        session.establish("abc".to_string(), Some("wss://resume".to_string()));
        session.observe_sequence(seq);
        session
    }

    #[test]
    fn test_new_session_cannot_resume() {
        let session = SessionState::new();
        assert!(!session.can_resume());
        assert!(session.resume_payload("t").is_none());
        assert_eq!(session.heartbeat_sequence(), None);
    }

    #[test]
    fn test_resume_payload_uses_last_sequence() {
        let session = established(57);
        let payload = session.resume_payload("tok").unwrap();
        assert_eq!(payload.session_id, "abc");
        assert_eq!(payload.seq, 57);
        assert_eq!(payload.token, "tok");
    }

    #[test]
    fn test_sequence_is_non_decreasing() {
        let mut session = established(1);
        let observed = [2, 3, 3, 2, 7, 5, 8];
        let mut last = session.sequence;
        for seq in observed {
            session.observe_sequence(seq);
            assert!(session.sequence >= last);
            last = session.sequence;
        }
        assert_eq!(session.sequence, 8);
    }

    #[test]
    fn test_stale_sequences_are_reported() {
        let mut session = established(10);
        assert_eq!(session.observe_sequence(10), SequenceCheck::Stale);
        assert_eq!(session.observe_sequence(9), SequenceCheck::Stale);
        assert_eq!(session.observe_sequence(11), SequenceCheck::Advanced);
    }

    #[test]
    fn test_invalidate_resets_session_but_keeps_interval() {
        let mut session = established(57);
        session.heartbeat_interval_ms = 41_250;
        session.invalidate();

        assert_eq!(
            session,
            SessionState {
                session_id: None,
                sequence: 0,
                resume_url: None,
                heartbeat_interval_ms: 41_250,
                resumable: false,
            }
        );
        assert!(!session.can_resume());
    }
}
