//! Debounced retirement of unwanted sections

use std::time::{Duration, Instant};

/// Outcome of evaluating an unwanted section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    /// The section just became unwanted; its deadline was set
    Armed,
    /// Still unwanted, deadline not reached
    Waiting,
    /// Continuously unwanted for the whole delay; destroy it now
    Expired,
}

/// Destroys a section only after it stayed unwanted for `delay`
///
/// Becoming wanted again before the deadline cancels the retirement without
/// touching the section's colliders.
#[derive(Debug, Clone, Copy)]
pub struct RetirementPolicy {
    delay: Duration,
}

impl RetirementPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Advance the deadline of a section absent from this step's needed set
    pub fn evaluate(&self, retire_at: &mut Option<Instant>, now: Instant) -> Retirement {
        match *retire_at {
            None => {
                *retire_at = Some(now + self.delay);
                Retirement::Armed
            }
            Some(deadline) if now >= deadline => Retirement::Expired,
            Some(_) => Retirement::Waiting,
        }
    }

    /// Clear the deadline of a section that is wanted again
    ///
    /// Returns whether a pending retirement was cancelled.
    pub fn cancel(retire_at: &mut Option<Instant>) -> bool {
        retire_at.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_then_expire() {
        let policy = RetirementPolicy::new(Duration::from_millis(500));
        let start = Instant::now();
        let mut retire_at = None;

        assert_eq!(policy.evaluate(&mut retire_at, start), Retirement::Armed);
        assert_eq!(retire_at, Some(start + Duration::from_millis(500)));

        let early = start + Duration::from_millis(499);
        assert_eq!(policy.evaluate(&mut retire_at, early), Retirement::Waiting);

        let due = start + Duration::from_millis(500);
        assert_eq!(policy.evaluate(&mut retire_at, due), Retirement::Expired);
    }

    #[test]
    fn test_cancel_resets_deadline() {
        let policy = RetirementPolicy::new(Duration::from_secs(1));
        let start = Instant::now();
        let mut retire_at = None;

        policy.evaluate(&mut retire_at, start);
        assert!(RetirementPolicy::cancel(&mut retire_at));
        assert!(!RetirementPolicy::cancel(&mut retire_at));

        // A later unwanted step starts a fresh full delay
        let later = start + Duration::from_millis(900);
        assert_eq!(policy.evaluate(&mut retire_at, later), Retirement::Armed);
        assert_eq!(
            policy.evaluate(&mut retire_at, start + Duration::from_millis(1500)),
            Retirement::Waiting
        );
    }

    #[test]
    fn test_zero_delay_expires_on_next_evaluation() {
        let policy = RetirementPolicy::new(Duration::ZERO);
        let now = Instant::now();
        let mut retire_at = None;

        assert_eq!(policy.evaluate(&mut retire_at, now), Retirement::Armed);
        assert_eq!(policy.evaluate(&mut retire_at, now), Retirement::Expired);
    }
}
