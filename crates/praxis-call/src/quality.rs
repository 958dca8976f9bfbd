use std::time::{Duration, Instant};

use tracing::info;

use praxis_types::call::NETWORK_SCORE_UNKNOWN;

#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Minimum spacing between samples; the provider can be chatty
    pub debounce: Duration,

    /// Scores strictly below this count as poor
    pub poor_threshold: i8,

    /// Scores at or above this count toward recovery
    pub recover_threshold: i8,

    /// How long a condition must hold before acting
    pub sustain: Duration,

    /// Apply the video toggle automatically instead of suggesting it
    pub auto_switch: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            poor_threshold: 2,
            recover_threshold: 3,
            sustain: Duration::from_secs(10),
            auto_switch: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySuggestion {
    DisableVideo,
    EnableVideo,
}

/// What the caller should do after feeding a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityAction {
    None,
    /// auto_switch: turn video off now
    AutoDisable,
    /// auto_switch: turn video back on now
    AutoEnable,
    /// Raise this suggestion to the user
    Suggest(QualitySuggestion),
}

/// Hysteresis over the provider's periodic network score (0-5, -1 unknown).
///
/// Sustained poor quality while video is on yields a single disable-video
/// action; sustained recovery after a disable *by this mechanism* yields a
/// single re-enable. At most one suggestion is pending at a time.
#[derive(Debug)]
pub struct AdaptiveQuality {
    config: QualityConfig,
    last_sample: Option<Instant>,
    poor_since: Option<Instant>,
    good_since: Option<Instant>,
    pending: Option<QualitySuggestion>,
    disabled_by_us: bool,
}

impl AdaptiveQuality {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            last_sample: None,
            poor_since: None,
            good_since: None,
            pending: None,
            disabled_by_us: false,
        }
    }

    pub fn pending(&self) -> Option<QualitySuggestion> {
        self.pending
    }

    /// The user accepted the pending suggestion; the caller performs the
    /// actual toggle. Returns what to apply.
    pub fn apply(&mut self) -> Option<QualitySuggestion> {
        let suggestion = self.pending.take()?;
        match suggestion {
            QualitySuggestion::DisableVideo => self.disabled_by_us = true,
            QualitySuggestion::EnableVideo => self.disabled_by_us = false,
        }
        self.poor_since = None;
        self.good_since = None;
        Some(suggestion)
    }

    /// Drop the pending suggestion. A new sustained period may raise a
    /// fresh one later.
    pub fn dismiss(&mut self) {
        self.pending = None;
        self.poor_since = None;
        self.good_since = None;
    }

    /// The user toggled video themselves; stop owning the disabled state.
    pub fn reset_ownership(&mut self) {
        self.disabled_by_us = false;
        self.good_since = None;
    }

    /// Feed one score sample. `video_enabled` is the local participant's
    /// current flag; `now` is injected for testability.
    pub fn observe(&mut self, score: i8, video_enabled: bool, now: Instant) -> QualityAction {
        // Debounce: at most one accepted sample per window
        if let Some(last) = self.last_sample {
            if now.duration_since(last) < self.config.debounce {
                return QualityAction::None;
            }
        }
        self.last_sample = Some(now);

        if score == NETWORK_SCORE_UNKNOWN {
            // Unknown never counts toward either condition
            self.poor_since = None;
            self.good_since = None;
            return QualityAction::None;
        }

        if video_enabled {
            self.good_since = None;
            if score < self.config.poor_threshold {
                let since = *self.poor_since.get_or_insert(now);
                if now.duration_since(since) >= self.config.sustain && self.pending.is_none() {
                    self.poor_since = None;
                    if self.config.auto_switch {
                        info!("network score held below {}, disabling video", self.config.poor_threshold);
                        self.disabled_by_us = true;
                        return QualityAction::AutoDisable;
                    }
                    self.pending = Some(QualitySuggestion::DisableVideo);
                    return QualityAction::Suggest(QualitySuggestion::DisableVideo);
                }
            } else {
                self.poor_since = None;
            }
            return QualityAction::None;
        }

        // Video is off. Recovery only applies if we turned it off.
        self.poor_since = None;
        if !self.disabled_by_us {
            return QualityAction::None;
        }
        if score >= self.config.recover_threshold {
            let since = *self.good_since.get_or_insert(now);
            if now.duration_since(since) >= self.config.sustain && self.pending.is_none() {
                self.good_since = None;
                if self.config.auto_switch {
                    info!("network recovered, re-enabling video");
                    self.disabled_by_us = false;
                    return QualityAction::AutoEnable;
                }
                self.pending = Some(QualitySuggestion::EnableVideo);
                return QualityAction::Suggest(QualitySuggestion::EnableVideo);
            }
        } else {
            self.good_since = None;
        }
        QualityAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(
        aq: &mut AdaptiveQuality,
        score: i8,
        video: bool,
        start: Instant,
        over: Duration,
        step: Duration,
    ) -> Vec<QualityAction> {
        let mut out = Vec::new();
        let mut t = Duration::ZERO;
        while t <= over {
            let action = aq.observe(score, video, start + t);
            if action != QualityAction::None {
                out.push(action);
            }
            t += step;
        }
        out
    }

    #[test]
    fn test_short_poor_period_never_triggers() {
        let mut aq = AdaptiveQuality::new(QualityConfig::default());
        let start = Instant::now();
        let actions = feed(
            &mut aq,
            1,
            true,
            start,
            Duration::from_secs(9),
            Duration::from_millis(500),
        );
        assert!(actions.is_empty());
        assert_eq!(aq.pending(), None);
    }

    #[test]
    fn test_sustained_poor_triggers_exactly_one_suggestion() {
        let mut aq = AdaptiveQuality::new(QualityConfig::default());
        let start = Instant::now();
        let actions = feed(
            &mut aq,
            1,
            true,
            start,
            Duration::from_secs(30),
            Duration::from_millis(500),
        );
        assert_eq!(
            actions,
            vec![QualityAction::Suggest(QualitySuggestion::DisableVideo)]
        );
        // A second sustained poor period while the first is unresolved
        // does not duplicate it
        assert_eq!(aq.pending(), Some(QualitySuggestion::DisableVideo));
    }

    #[test]
    fn test_recovery_after_apply() {
        let mut aq = AdaptiveQuality::new(QualityConfig::default());
        let start = Instant::now();
        feed(&mut aq, 1, true, start, Duration::from_secs(11), Duration::from_millis(500));
        assert_eq!(aq.apply(), Some(QualitySuggestion::DisableVideo));

        // Video now off; sustained good score raises the re-enable
        let later = start + Duration::from_secs(60);
        let actions = feed(
            &mut aq,
            4,
            false,
            later,
            Duration::from_secs(15),
            Duration::from_millis(500),
        );
        assert_eq!(
            actions,
            vec![QualityAction::Suggest(QualitySuggestion::EnableVideo)]
        );
    }

    #[test]
    fn test_no_reenable_if_user_disabled_video() {
        let mut aq = AdaptiveQuality::new(QualityConfig::default());
        let start = Instant::now();
        // Video off but not by us: recovery must stay quiet
        let actions = feed(
            &mut aq,
            5,
            false,
            start,
            Duration::from_secs(30),
            Duration::from_millis(500),
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn test_unknown_score_resets_the_clock() {
        let mut aq = AdaptiveQuality::new(QualityConfig::default());
        let start = Instant::now();
        feed(&mut aq, 1, true, start, Duration::from_secs(8), Duration::from_millis(500));
        // Unknown sample interrupts the sustained period
        aq.observe(NETWORK_SCORE_UNKNOWN, true, start + Duration::from_secs(9));
        let actions = feed(
            &mut aq,
            1,
            true,
            start + Duration::from_secs(10),
            Duration::from_secs(8),
            Duration::from_millis(500),
        );
        assert!(actions.is_empty(), "clock restarted after unknown");
    }

    #[test]
    fn test_debounce_swallows_rapid_samples() {
        let mut aq = AdaptiveQuality::new(QualityConfig::default());
        let start = Instant::now();
        assert_eq!(aq.observe(1, true, start), QualityAction::None);
        // 100ms later: inside the debounce window, ignored entirely
        let a = aq.observe(1, true, start + Duration::from_millis(100));
        assert_eq!(a, QualityAction::None);
        assert!(aq.last_sample == Some(start));
    }

    #[test]
    fn test_auto_switch_disables_and_recovers() {
        let cfg = QualityConfig { auto_switch: true, ..QualityConfig::default() };
        let mut aq = AdaptiveQuality::new(cfg);
        let start = Instant::now();
        let actions = feed(&mut aq, 0, true, start, Duration::from_secs(11), Duration::from_millis(500));
        assert_eq!(actions, vec![QualityAction::AutoDisable]);

        let later = start + Duration::from_secs(30);
        let actions = feed(&mut aq, 4, false, later, Duration::from_secs(11), Duration::from_millis(500));
        assert_eq!(actions, vec![QualityAction::AutoEnable]);
    }
}
