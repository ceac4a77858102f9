use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    PendingShow { due: Instant },
    Shown,
    PendingHide { due: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverEffect {
    Show,
    Hide,
}

/// Delayed show/hide of one marker's panel.
///
/// Only one deadline is ever armed: entering cancels a pending hide and
/// leaving cancels a pending show, so quick passes of the pointer never open
/// a panel and moving from the marker into its panel never closes it.
#[derive(Debug, Clone)]
pub struct HoverIntent {
    delay: Duration,
    phase: Phase,
}

impl HoverIntent {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            phase: Phase::Idle,
        }
    }

    pub fn enter(&mut self, now: Instant) {
        self.phase = match self.phase {
            Phase::Idle => Phase::PendingShow {
                due: now + self.delay,
            },
            Phase::PendingHide { .. } | Phase::Shown => Phase::Shown,
            pending @ Phase::PendingShow { .. } => pending,
        };
    }

    pub fn leave(&mut self, now: Instant) {
        self.phase = match self.phase {
            Phase::PendingShow { .. } | Phase::Idle => Phase::Idle,
            Phase::Shown => Phase::PendingHide {
                due: now + self.delay,
            },
            pending @ Phase::PendingHide { .. } => pending,
        };
    }

    /// Fires the armed deadline once it has passed.
    pub fn poll(&mut self, now: Instant) -> Option<HoverEffect> {
        match self.phase {
            Phase::PendingShow { due } if now >= due => {
                self.phase = Phase::Shown;
                Some(HoverEffect::Show)
            }
            Phase::PendingHide { due } if now >= due => {
                self.phase = Phase::Idle;
                Some(HoverEffect::Hide)
            }
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::PendingShow { due } | Phase::PendingHide { due } => Some(due),
            Phase::Idle | Phase::Shown => None,
        }
    }

    /// Whether the panel is currently open (including while a hide is pending).
    pub fn is_shown(&self) -> bool {
        matches!(self.phase, Phase::Shown | Phase::PendingHide { .. })
    }

    /// Forgets any pending deadline without emitting an effect.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(300);

    #[test]
    fn shows_after_delay_and_hides_after_leaving() {
        let start = Instant::now();
        let mut hover = HoverIntent::new(DELAY);
        hover.enter(start);
        assert_eq!(hover.deadline(), Some(start + DELAY));
        assert_eq!(hover.poll(start + Duration::from_millis(299)), None);
        assert_eq!(hover.poll(start + DELAY), Some(HoverEffect::Show));
        assert!(hover.is_shown());
        assert_eq!(hover.deadline(), None);

        let out = start + Duration::from_secs(1);
        hover.leave(out);
        assert!(hover.is_shown());
        assert_eq!(hover.poll(out + DELAY), Some(HoverEffect::Hide));
        assert!(!hover.is_shown());
        assert_eq!(hover.poll(out + DELAY * 2), None);
    }

    #[test]
    fn quick_pass_never_shows() {
        let start = Instant::now();
        let mut hover = HoverIntent::new(DELAY);
        hover.enter(start);
        hover.leave(start + Duration::from_millis(100));
        assert_eq!(hover.deadline(), None);
        assert_eq!(hover.poll(start + DELAY * 3), None);
    }

    #[test]
    fn reentering_cancels_pending_hide() {
        let start = Instant::now();
        let mut hover = HoverIntent::new(DELAY);
        hover.enter(start);
        hover.poll(start + DELAY);
        hover.leave(start + Duration::from_millis(400));
        hover.enter(start + Duration::from_millis(500));
        assert_eq!(hover.deadline(), None);
        assert_eq!(hover.poll(start + Duration::from_secs(5)), None);
        assert!(hover.is_shown());
    }

    #[test]
    fn repeated_enter_keeps_first_deadline() {
        let start = Instant::now();
        let mut hover = HoverIntent::new(DELAY);
        hover.enter(start);
        hover.enter(start + Duration::from_millis(200));
        assert_eq!(hover.deadline(), Some(start + DELAY));
    }
}
