use praxis_types::call::TranscriptSegment;

/// Accumulates live transcript segments keyed by the provider-issued id.
///
/// The recognizer streams interim (`is_final: false`) segments and later
/// replaces them with a final one under the same id; replacement happens in
/// place so the projection never jumps around. On exit only final segments
/// are serialized.
#[derive(Debug, Default)]
pub struct TranscriptCapture {
    segments: Vec<TranscriptSegment>,
}

impl TranscriptCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn push(&mut self, segment: TranscriptSegment) {
        match self.segments.iter().position(|s| s.id == segment.id) {
            // Interim output superseded in place
            Some(pos) if !self.segments[pos].is_final => self.segments[pos] = segment,
            // A final segment is never replaced (duplicate delivery)
            Some(_) => {}
            None => self.segments.push(segment),
        }
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Render the finalized transcript: final segments sorted by timestamp,
    /// one `[HH:MM:SS] speaker: text` line each. `None` when nothing was
    /// finalized.
    pub fn flush_final(&self) -> Option<String> {
        let mut finals: Vec<&TranscriptSegment> =
            self.segments.iter().filter(|s| s.is_final).collect();
        if finals.is_empty() {
            return None;
        }
        finals.sort_by_key(|s| s.at);
        let text = finals
            .iter()
            .map(|s| format!("[{}] {}: {}", s.at.format("%H:%M:%S"), s.speaker_name, s.text))
            .collect::<Vec<_>>()
            .join("\n");
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn seg(id: &str, speaker: &str, text: &str, secs: u32, is_final: bool) -> TranscriptSegment {
        TranscriptSegment {
            id: id.into(),
            speaker_name: speaker.into(),
            text: text.into(),
            at: Utc.with_ymd_and_hms(2024, 3, 14, 10, 30, secs).unwrap(),
            is_final,
        }
    }

    #[test]
    fn test_final_replaces_interim_in_place() {
        let mut cap = TranscriptCapture::new();
        cap.push(seg("a", "Ana", "bom d", 0, false));
        cap.push(seg("b", "Beto", "oi", 2, true));
        cap.push(seg("a", "Ana", "bom dia", 0, true));

        assert_eq!(cap.segments().len(), 2);
        assert_eq!(cap.segments()[0].text, "bom dia");
        assert!(cap.segments()[0].is_final);
    }

    #[test]
    fn test_duplicate_final_is_ignored() {
        let mut cap = TranscriptCapture::new();
        cap.push(seg("a", "Ana", "bom dia", 0, true));
        cap.push(seg("a", "Ana", "bom dia!!", 0, true));
        assert_eq!(cap.segments().len(), 1);
        assert_eq!(cap.segments()[0].text, "bom dia");
    }

    #[test]
    fn test_flush_renders_only_finals_in_time_order() {
        let mut cap = TranscriptCapture::new();
        cap.push(seg("b", "Beto", "oi Ana", 5, true));
        cap.push(seg("a", "Ana", "bom dia", 1, true));
        cap.push(seg("c", "Ana", "interim junk", 9, false));

        let text = cap.flush_final().unwrap();
        assert_eq!(text, "[10:30:01] Ana: bom dia\n[10:30:05] Beto: oi Ana");
    }

    #[test]
    fn test_flush_with_no_finals_is_none() {
        let mut cap = TranscriptCapture::new();
        assert_eq!(cap.flush_final(), None);
        cap.push(seg("a", "Ana", "ainda falando", 0, false));
        assert_eq!(cap.flush_final(), None);
    }
}
