use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score reported when the provider has not measured quality yet.
pub const NETWORK_SCORE_UNKNOWN: i8 = -1;

/// A participant in a call session, as observed from the video-session
/// provider. `id` is the provider-issued participant id, not our user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub user_name: String,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screenshare_enabled: bool,
    pub network_score: i8,
}

impl Participant {
    pub fn new(id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_name: user_name.into(),
            audio_enabled: false,
            video_enabled: false,
            screenshare_enabled: false,
            network_score: NETWORK_SCORE_UNKNOWN,
        }
    }
}

/// Recording lifecycle. Moves forward only, except for an explicit stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Starting,
    Recording { recording_id: String },
    Stopping,
}

/// One transcript line from the provider. Non-final segments are interim
/// recognizer output and may be superseded by a final segment with the
/// same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub speaker_name: String,
    pub text: String,
    pub at: DateTime<Utc>,
    pub is_final: bool,
}

/// Local record of an in-progress call, reconciled against provider events.
/// Only the call controller mutates this; everything else reads snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub meeting_id: String,
    pub self_participant: Participant,
    pub participants: HashMap<String, Participant>,
    pub recording: RecordingState,
    pub screenshare_owner: Option<String>,
    pub network_score: i8,
}

impl CallSession {
    pub fn new(meeting_id: impl Into<String>, self_participant: Participant) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            self_participant,
            participants: HashMap::new(),
            recording: RecordingState::Idle,
            screenshare_owner: None,
            network_score: NETWORK_SCORE_UNKNOWN,
        }
    }

    /// Insert or refresh a participant. Keyed by participant id, so
    /// duplicate join events collapse into one entry.
    pub fn upsert_participant(&mut self, participant: Participant) {
        if participant.id == self.self_participant.id {
            self.self_participant = participant;
            return;
        }
        self.participants.insert(participant.id.clone(), participant);
    }

    pub fn remove_participant(&mut self, participant_id: &str) {
        self.participants.remove(participant_id);
    }

    fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        if participant_id == self.self_participant.id {
            Some(&mut self.self_participant)
        } else {
            self.participants.get_mut(participant_id)
        }
    }

    pub fn apply_audio_update(&mut self, participant_id: &str, enabled: bool) {
        if let Some(p) = self.participant_mut(participant_id) {
            p.audio_enabled = enabled;
        }
    }

    pub fn apply_video_update(&mut self, participant_id: &str, enabled: bool) {
        if let Some(p) = self.participant_mut(participant_id) {
            p.video_enabled = enabled;
        }
    }

    pub fn apply_screenshare_update(&mut self, participant_id: &str, enabled: bool) {
        if let Some(p) = self.participant_mut(participant_id) {
            p.screenshare_enabled = enabled;
        }
    }

    /// Distinct active participants, including self.
    pub fn participant_count(&self) -> usize {
        1 + self.participants.len()
    }

    /// Names of everyone on the call, self first.
    pub fn participant_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.participant_count());
        names.push(self.self_participant.user_name.clone());
        let mut rest: Vec<&Participant> = self.participants.values().collect();
        rest.sort_by(|a, b| a.id.cmp(&b.id));
        names.extend(rest.into_iter().map(|p| p.user_name.clone()));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new("meet-1", Participant::new("self", "Ana"))
    }

    #[test]
    fn test_duplicate_join_collapses() {
        let mut s = session();
        s.upsert_participant(Participant::new("p2", "Beto"));
        s.upsert_participant(Participant::new("p2", "Beto"));
        assert_eq!(s.participant_count(), 2);
    }

    #[test]
    fn test_self_updates_do_not_land_in_participants() {
        let mut s = session();
        let mut me = Participant::new("self", "Ana");
        me.audio_enabled = true;
        s.upsert_participant(me);
        assert!(s.participants.is_empty());
        assert!(s.self_participant.audio_enabled);
    }

    #[test]
    fn test_flag_updates_target_the_right_participant() {
        let mut s = session();
        s.upsert_participant(Participant::new("p2", "Beto"));
        s.apply_video_update("p2", true);
        s.apply_audio_update("self", true);
        assert!(s.participants["p2"].video_enabled);
        assert!(s.self_participant.audio_enabled);
        // Unknown ids are ignored
        s.apply_audio_update("ghost", true);
    }
}
