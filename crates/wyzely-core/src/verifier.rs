// Command verification
//
// The cloud acknowledges writes long before a camera acts on them, and a
// poll in between still reports the old value. After a command the
// verifier reports the requested value until the device has agreed for a
// stabilization window, or until a deadline passes. Time is passed in so
// the state machine runs the same under tests.

use std::time::{Duration, Instant};

/// Deadline for the device to confirm a command.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// How long the device must agree before the command counts as applied.
pub const DEFAULT_STABILIZATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierPolicy {
    pub deadline: Duration,
    pub stabilization: Duration,
}

impl Default for VerifierPolicy {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            stabilization: DEFAULT_STABILIZATION,
        }
    }
}

/// A command waiting for the device to agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub device: String,
    pub field: String,
    pub desired: bool,
    pub issued_at: Instant,
    pub expires_at: Instant,
    /// Start of the current run of agreeing observations.
    pub matched_since: Option<Instant>,
}

/// How the last command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The device agreed for the whole stabilization window.
    Stable,
    /// The deadline passed first.
    Expired,
    /// The write itself failed.
    Cancelled,
}

/// Per-(device, field) verification state.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    policy: VerifierPolicy,
    pending: Option<PendingCommand>,
    last_outcome: Option<Outcome>,
}

impl CommandVerifier {
    pub fn new(policy: VerifierPolicy) -> Self {
        Self {
            policy,
            pending: None,
            last_outcome: None,
        }
    }

    /// Start tracking a command. Replaces any command still pending.
    pub fn begin(&mut self, device: &str, field: &str, desired: bool, now: Instant) {
        self.pending = Some(PendingCommand {
            device: device.to_owned(),
            field: field.to_owned(),
            desired,
            issued_at: now,
            expires_at: now + self.policy.deadline,
            matched_since: None,
        });
    }

    /// Drop the pending command without waiting for the device.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            self.last_outcome = Some(Outcome::Cancelled);
        }
    }

    /// Feed one device observation and get the value to report.
    pub fn observe(&mut self, actual: bool, now: Instant) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return actual;
        };

        if now >= pending.expires_at {
            self.pending = None;
            self.last_outcome = Some(Outcome::Expired);
            return actual;
        }

        if actual == pending.desired {
            let since = *pending.matched_since.get_or_insert(now);
            if now.duration_since(since) >= self.policy.stabilization {
                self.pending = None;
                self.last_outcome = Some(Outcome::Stable);
            }
            return actual;
        }

        pending.matched_since = None;
        pending.desired
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }
}

impl Default for CommandVerifier {
    fn default() -> Self {
        Self::new(VerifierPolicy::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn idle_verifier_passes_readings_through() {
        let mut v = CommandVerifier::default();
        let t0 = Instant::now();
        assert!(v.observe(true, t0));
        assert!(!v.observe(false, t0));
        assert!(!v.is_pending());
    }

    #[test]
    fn stale_readings_report_the_requested_value() {
        let mut v = CommandVerifier::default();
        let t0 = Instant::now();
        v.begin("AA", "power_switch", true, t0);

        assert!(v.observe(false, t0 + secs(1)));
        assert!(v.observe(false, t0 + secs(5)));
        assert!(v.is_pending());
    }

    #[test]
    fn agreement_must_hold_for_the_window() {
        let mut v = CommandVerifier::default();
        let t0 = Instant::now();
        v.begin("AA", "power_switch", true, t0);

        assert!(v.observe(true, t0 + secs(1)));
        // Flapping back resets the window.
        assert!(v.observe(false, t0 + secs(2)));
        assert_eq!(v.pending().unwrap().matched_since, None);
        assert!(v.observe(true, t0 + secs(3)));
        assert!(v.observe(true, t0 + secs(5)));
        assert!(v.is_pending());
        assert!(v.observe(true, t0 + secs(6)));
        assert!(!v.is_pending());
        assert_eq!(v.last_outcome(), Some(Outcome::Stable));
    }

    #[test]
    fn deadline_reports_the_device_value() {
        let mut v = CommandVerifier::default();
        let t0 = Instant::now();
        v.begin("AA", "power_switch", true, t0);

        assert!(v.observe(false, t0 + secs(14)));
        assert!(!v.observe(false, t0 + secs(15)));
        assert_eq!(v.last_outcome(), Some(Outcome::Expired));
        assert!(!v.observe(false, t0 + secs(16)));
    }

    #[test]
    fn cancel_stops_masking() {
        let mut v = CommandVerifier::default();
        let t0 = Instant::now();
        v.begin("AA", "power_switch", false, t0);
        v.cancel();
        assert!(v.observe(true, t0));
        assert_eq!(v.last_outcome(), Some(Outcome::Cancelled));
    }
}
