use crate::util::format_seconds;
use rand::Rng;
use std::time::{Duration, Instant};

/// Key the best time is persisted under (see `crate::store`).
pub const BEST_TIME_KEY: &str = "reaction-timer-best";

/// Human-readable name of the trigger key, used in the idle prompt.
pub const TRIGGER_LABEL: &str = "Space";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum GameState {
    Idle,
    Waiting,
    Armed,
    Result,
    Penalty,
}

/// The three timer roles a state can schedule. At most one timer is pending
/// at any time; entering a state replaces whatever the previous state had.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Waiting -> Armed after the random delay
    Arm,
    /// Armed -> Result (timeout variant) when no trigger arrives in time
    ReactionTimeout,
    /// Result/Penalty -> Idle
    Return,
}

/// Identity of a scheduled timer. The sequence number lets a fire that was
/// superseded by a state change be recognized as stale and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFire {
    pub kind: TimerKind,
    pub seq: u64,
}

#[derive(Clone, Copy, Debug)]
struct PendingTimer {
    kind: TimerKind,
    deadline: Instant,
    seq: u64,
}

/// How the last completed round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Valid reaction, latency in whole milliseconds
    Scored(u64),
    /// No trigger within the reaction window
    Timeout,
}

/// Request for the caller to persist a new best time. The session itself
/// never performs I/O; saves are dispatched fire-and-forget by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveBest(pub u64);

/// What the display sink should show for the current state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayFields {
    pub status: String,
    pub readout: String,
    pub highlight: bool,
}

/// Tunable round durations. All five are configurable via config file / CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub reaction_timeout: Duration,
    pub penalty_duration: Duration,
    pub result_duration: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(4000),
            reaction_timeout: Duration::from_millis(2000),
            penalty_duration: Duration::from_millis(1500),
            result_duration: Duration::from_millis(3000),
        }
    }
}

/// The reaction game state machine. All mutation happens on the event loop
/// thread; triggers and timer fires are delivered one at a time, so a
/// transition's state read and write never interleave with another's.
#[derive(Debug)]
pub struct GameSession {
    state: GameState,
    timing: Timing,
    /// set iff state == Armed
    armed_at: Option<Instant>,
    last_outcome: Option<RoundOutcome>,
    best_ms: Option<u64>,
    /// last scored round improved on the previous best
    new_best: bool,
    /// stored best has been loaded and reconciled
    hydrated: bool,
    /// a best was persisted before hydration finished
    saved_pre_hydration: bool,
    pending: Option<PendingTimer>,
    next_seq: u64,
}

impl GameSession {
    pub fn new(timing: Timing) -> Self {
        Self {
            state: GameState::Idle,
            timing,
            armed_at: None,
            last_outcome: None,
            best_ms: None,
            new_best: false,
            hydrated: false,
            saved_pre_hydration: false,
            pending: None,
            next_seq: 0,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn best_ms(&self) -> Option<u64> {
        self.best_ms
    }

    pub fn last_outcome(&self) -> Option<RoundOutcome> {
        self.last_outcome
    }

    /// Kind and deadline of the currently scheduled timer, if any.
    pub fn pending_timer(&self) -> Option<(TimerKind, Instant)> {
        self.pending.map(|p| (p.kind, p.deadline))
    }

    /// Handle one discrete trigger event (side button / spacebar). Never
    /// fails; every call resolves into exactly one transition from the table,
    /// or a no-op while in Penalty. Returns a save request when the round
    /// produced a new best.
    pub fn on_trigger(&mut self, now: Instant) -> Option<SaveBest> {
        match self.state {
            GameState::Idle => {
                self.enter_waiting(now);
                None
            }
            GameState::Waiting => {
                // too early: cancel the arm timer and sit out the penalty
                self.state = GameState::Penalty;
                self.schedule(TimerKind::Return, self.timing.penalty_duration, now);
                None
            }
            GameState::Armed => {
                let armed_at = self.armed_at.take().unwrap_or(now);
                let ms = round_ms(now.duration_since(armed_at));
                self.last_outcome = Some(RoundOutcome::Scored(ms));
                self.new_best = self.best_ms.map_or(true, |best| ms < best);
                self.state = GameState::Result;
                self.schedule(TimerKind::Return, self.timing.result_duration, now);
                if self.new_best {
                    self.best_ms = Some(ms);
                    if !self.hydrated {
                        self.saved_pre_hydration = true;
                    }
                    Some(SaveBest(ms))
                } else {
                    None
                }
            }
            GameState::Result => {
                // re-arm straight into a new round
                self.enter_waiting(now);
                None
            }
            GameState::Penalty => None,
        }
    }

    /// Fire the timer identified by `fire`. A fire whose (kind, seq) no
    /// longer matches the pending timer belongs to a superseded state and is
    /// dropped without any observable effect.
    pub fn on_timer_fire(&mut self, fire: TimerFire, now: Instant) {
        let Some(current) = self.pending else {
            return;
        };
        if current.kind != fire.kind || current.seq != fire.seq {
            return;
        }
        self.pending = None;

        match fire.kind {
            TimerKind::Arm => {
                self.state = GameState::Armed;
                self.armed_at = Some(now);
                self.schedule(TimerKind::ReactionTimeout, self.timing.reaction_timeout, now);
            }
            TimerKind::ReactionTimeout => {
                self.armed_at = None;
                self.last_outcome = Some(RoundOutcome::Timeout);
                self.new_best = false;
                self.state = GameState::Result;
                self.schedule(TimerKind::Return, self.timing.result_duration, now);
            }
            TimerKind::Return => {
                self.state = GameState::Idle;
            }
        }
    }

    /// Fire the pending timer if its deadline has elapsed. Called from the
    /// event loop on every tick.
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(p) = self.pending {
            if now >= p.deadline {
                self.on_timer_fire(TimerFire { kind: p.kind, seq: p.seq }, now);
            }
        }
    }

    /// Reconcile the asynchronously loaded stored best with whatever has been
    /// recorded in the meantime: the minimum wins. If a round already
    /// persisted a value and the stored one turns out smaller, the disk copy
    /// was clobbered with the larger value and a corrective save is requested.
    pub fn absorb_loaded_best(&mut self, loaded: Option<u64>) -> Option<SaveBest> {
        self.hydrated = true;
        let loaded = loaded?;
        match self.best_ms {
            None => {
                self.best_ms = Some(loaded);
                None
            }
            Some(current) if loaded < current => {
                self.best_ms = Some(loaded);
                if self.saved_pre_hydration {
                    Some(SaveBest(loaded))
                } else {
                    None
                }
            }
            Some(_) => None,
        }
    }

    /// Projection consumed by the display sink.
    pub fn display(&self) -> DisplayFields {
        match self.state {
            GameState::Idle => DisplayFields {
                status: format!("Press {} to Start", TRIGGER_LABEL),
                readout: "0.000s".to_string(),
                highlight: false,
            },
            GameState::Waiting => DisplayFields {
                status: "Wait for Green...".to_string(),
                readout: "WAIT".to_string(),
                highlight: false,
            },
            GameState::Armed => DisplayFields {
                status: "REACT NOW!".to_string(),
                readout: "GO!".to_string(),
                highlight: true,
            },
            GameState::Penalty => DisplayFields {
                status: "Too Early!".to_string(),
                readout: "PENALTY".to_string(),
                highlight: false,
            },
            GameState::Result => match self.last_outcome {
                Some(RoundOutcome::Scored(ms)) => DisplayFields {
                    status: if self.new_best {
                        "NEW BEST!".to_string()
                    } else {
                        "Your Time:".to_string()
                    },
                    readout: format_seconds(ms),
                    highlight: true,
                },
                Some(RoundOutcome::Timeout) | None => DisplayFields {
                    status: "Too Slow!".to_string(),
                    readout: "TIMEOUT".to_string(),
                    highlight: false,
                },
            },
        }
    }

    fn enter_waiting(&mut self, now: Instant) {
        self.state = GameState::Waiting;
        self.armed_at = None;
        self.new_best = false;
        let delay = self.draw_delay();
        self.schedule(TimerKind::Arm, delay, now);
    }

    /// Replace the pending timer. Bumping the sequence number is what makes
    /// any fire scheduled before this call stale.
    fn schedule(&mut self, kind: TimerKind, delay: Duration, now: Instant) {
        self.next_seq += 1;
        self.pending = Some(PendingTimer {
            kind,
            deadline: now + delay,
            seq: self.next_seq,
        });
    }

    fn draw_delay(&self) -> Duration {
        let min = self.timing.min_delay.as_millis() as u64;
        let max = self.timing.max_delay.as_millis() as u64;
        if max <= min {
            return self.timing.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Latency measured with the monotonic clock's sub-millisecond precision,
/// rounded to whole milliseconds. Display, best comparison and the persisted
/// value all use this same rounding.
fn round_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fixed_timing() -> Timing {
        // min == max so the arm delay is deterministic
        Timing {
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(1000),
            reaction_timeout: Duration::from_millis(2000),
            penalty_duration: Duration::from_millis(1500),
            result_duration: Duration::from_millis(3000),
        }
    }

    fn arm(session: &mut GameSession, t0: Instant) -> Instant {
        assert_eq!(session.state(), GameState::Idle);
        session.on_trigger(t0);
        assert_eq!(session.state(), GameState::Waiting);
        let armed_time = t0 + Duration::from_millis(1000);
        session.on_tick(armed_time);
        assert_eq!(session.state(), GameState::Armed);
        armed_time
    }

    #[test]
    fn starts_idle_with_no_best() {
        let session = GameSession::new(Timing::default());
        assert_eq!(session.state(), GameState::Idle);
        assert_eq!(session.best_ms(), None);
        assert_eq!(session.last_outcome(), None);
        assert_eq!(session.pending_timer(), None);
    }

    #[test]
    fn trigger_in_idle_starts_waiting_with_arm_timer() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();

        assert_eq!(session.on_trigger(t0), None);
        assert_eq!(session.state(), GameState::Waiting);
        let (kind, deadline) = session.pending_timer().unwrap();
        assert_eq!(kind, TimerKind::Arm);
        assert_eq!(deadline, t0 + Duration::from_millis(1000));
    }

    #[test]
    fn arm_delay_stays_within_configured_window() {
        let timing = Timing::default();
        for _ in 0..50 {
            let mut session = GameSession::new(timing);
            let t0 = Instant::now();
            session.on_trigger(t0);
            let (_, deadline) = session.pending_timer().unwrap();
            let delay = deadline.duration_since(t0);
            assert!(delay >= timing.min_delay, "delay below minimum: {delay:?}");
            assert!(delay <= timing.max_delay, "delay above maximum: {delay:?}");
        }
    }

    #[test]
    fn arm_timer_fire_records_armed_at_and_schedules_timeout() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);

        let (kind, deadline) = session.pending_timer().unwrap();
        assert_eq!(kind, TimerKind::ReactionTimeout);
        assert_eq!(deadline, armed_time + Duration::from_millis(2000));
    }

    #[test]
    fn valid_trigger_scores_the_round() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);

        let save = session.on_trigger(armed_time + Duration::from_millis(180));
        assert_eq!(save, Some(SaveBest(180)));
        assert_eq!(session.state(), GameState::Result);
        assert_matches!(session.last_outcome(), Some(RoundOutcome::Scored(180)));
        assert_eq!(session.best_ms(), Some(180));
    }

    #[test]
    fn early_trigger_lands_in_penalty_never_result() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        session.on_trigger(t0);

        // trigger strictly before the arm deadline
        let early = t0 + Duration::from_millis(400);
        assert_eq!(session.on_trigger(early), None);
        assert_eq!(session.state(), GameState::Penalty);
        let (kind, deadline) = session.pending_timer().unwrap();
        assert_eq!(kind, TimerKind::Return);
        assert_eq!(deadline, early + Duration::from_millis(1500));

        // further triggers while penalized are ignored
        session.on_trigger(early + Duration::from_millis(100));
        assert_eq!(session.state(), GameState::Penalty);

        // penalty elapses back to idle
        session.on_tick(early + Duration::from_millis(1500));
        assert_eq!(session.state(), GameState::Idle);
    }

    #[test]
    fn no_trigger_within_timeout_yields_timeout_result() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);

        session.on_tick(armed_time + Duration::from_millis(2000));
        assert_eq!(session.state(), GameState::Result);
        assert_eq!(session.last_outcome(), Some(RoundOutcome::Timeout));
        assert_eq!(session.best_ms(), None);

        session.on_tick(armed_time + Duration::from_millis(5000));
        assert_eq!(session.state(), GameState::Idle);
    }

    #[test]
    fn best_is_min_over_completed_rounds() {
        let mut session = GameSession::new(fixed_timing());
        let mut t = Instant::now();

        for (reaction, expected_best) in [(250u64, 250u64), (180, 180), (300, 180), (179, 179)] {
            let armed_time = arm(&mut session, t);
            let save = session.on_trigger(armed_time + Duration::from_millis(reaction));
            if expected_best == reaction {
                assert_eq!(save, Some(SaveBest(reaction)));
            } else {
                assert_eq!(save, None);
            }
            assert_eq!(session.best_ms(), Some(expected_best));
            // let the result screen run out
            t = armed_time + Duration::from_millis(reaction + 3000);
            session.on_tick(t);
            assert_eq!(session.state(), GameState::Idle);
        }
    }

    #[test]
    fn stale_timer_fire_is_ignored() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        session.on_trigger(t0);
        let (kind, _) = session.pending_timer().unwrap();
        assert_eq!(kind, TimerKind::Arm);
        let stale = TimerFire { kind: TimerKind::Arm, seq: 1 };

        // an early trigger supersedes the arm timer
        session.on_trigger(t0 + Duration::from_millis(100));
        assert_eq!(session.state(), GameState::Penalty);

        // the canceled arm timer fires late: no observable change
        session.on_timer_fire(stale, t0 + Duration::from_millis(1000));
        assert_eq!(session.state(), GameState::Penalty);
        let (kind, _) = session.pending_timer().unwrap();
        assert_eq!(kind, TimerKind::Return);
    }

    #[test]
    fn fire_with_wrong_seq_for_same_kind_is_ignored() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        // first round reaches Penalty (seq 1 = Arm, seq 2 = Return)
        session.on_trigger(t0);
        session.on_trigger(t0 + Duration::from_millis(10));
        session.on_tick(t0 + Duration::from_millis(1510));
        // second round schedules a fresh Arm timer (seq 3)
        session.on_trigger(t0 + Duration::from_millis(1600));
        assert_eq!(session.state(), GameState::Waiting);

        // a fire for the first round's Arm timer must not arm this round
        session.on_timer_fire(
            TimerFire { kind: TimerKind::Arm, seq: 1 },
            t0 + Duration::from_millis(1700),
        );
        assert_eq!(session.state(), GameState::Waiting);
    }

    #[test]
    fn trigger_in_result_rearms_immediately() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);
        session.on_trigger(armed_time + Duration::from_millis(200));
        assert_eq!(session.state(), GameState::Result);

        let restart = armed_time + Duration::from_millis(500);
        session.on_trigger(restart);
        assert_eq!(session.state(), GameState::Waiting);
        let (kind, deadline) = session.pending_timer().unwrap();
        assert_eq!(kind, TimerKind::Arm);
        assert_eq!(deadline, restart + Duration::from_millis(1000));
    }

    #[test]
    fn tick_before_deadline_does_nothing() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        session.on_trigger(t0);
        session.on_tick(t0 + Duration::from_millis(999));
        assert_eq!(session.state(), GameState::Waiting);
        session.on_tick(t0 + Duration::from_millis(1000));
        assert_eq!(session.state(), GameState::Armed);
    }

    #[test]
    fn display_texts_per_state() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();

        let idle = session.display();
        assert_eq!(idle.status, "Press Space to Start");
        assert_eq!(idle.readout, "0.000s");
        assert!(!idle.highlight);

        session.on_trigger(t0);
        let waiting = session.display();
        assert_eq!(waiting.status, "Wait for Green...");
        assert_eq!(waiting.readout, "WAIT");
        assert!(!waiting.highlight);

        let armed_time = t0 + Duration::from_millis(1000);
        session.on_tick(armed_time);
        let armed = session.display();
        assert_eq!(armed.status, "REACT NOW!");
        assert_eq!(armed.readout, "GO!");
        assert!(armed.highlight);

        session.on_trigger(armed_time + Duration::from_millis(180));
        let result = session.display();
        assert_eq!(result.status, "NEW BEST!");
        assert_eq!(result.readout, "0.180s");
        assert!(result.highlight);
    }

    #[test]
    fn display_shows_your_time_when_not_a_best() {
        let mut session = GameSession::new(fixed_timing());
        session.absorb_loaded_best(Some(100));
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);
        session.on_trigger(armed_time + Duration::from_millis(250));

        let result = session.display();
        assert_eq!(result.status, "Your Time:");
        assert_eq!(result.readout, "0.250s");
    }

    #[test]
    fn display_timeout_variant() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);
        session.on_tick(armed_time + Duration::from_millis(2000));

        let result = session.display();
        assert_eq!(result.status, "Too Slow!");
        assert_eq!(result.readout, "TIMEOUT");
        assert!(!result.highlight);
    }

    #[test]
    fn display_penalty_variant() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        session.on_trigger(t0);
        session.on_trigger(t0 + Duration::from_millis(10));

        let penalty = session.display();
        assert_eq!(penalty.status, "Too Early!");
        assert_eq!(penalty.readout, "PENALTY");
    }

    #[test]
    fn hydration_before_any_round_sets_best() {
        let mut session = GameSession::new(fixed_timing());
        assert_eq!(session.absorb_loaded_best(Some(210)), None);
        assert_eq!(session.best_ms(), Some(210));
    }

    #[test]
    fn hydration_with_nothing_stored_leaves_best_absent() {
        let mut session = GameSession::new(fixed_timing());
        assert_eq!(session.absorb_loaded_best(None), None);
        assert_eq!(session.best_ms(), None);
    }

    #[test]
    fn late_hydration_takes_min_and_requests_corrective_save() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        // round completes (and persists 300) before the stored best arrives
        let armed_time = arm(&mut session, t0);
        assert_eq!(
            session.on_trigger(armed_time + Duration::from_millis(300)),
            Some(SaveBest(300))
        );

        // stored best was 150; disk now holds 300, so a re-save is requested
        assert_eq!(session.absorb_loaded_best(Some(150)), Some(SaveBest(150)));
        assert_eq!(session.best_ms(), Some(150));
    }

    #[test]
    fn late_hydration_with_larger_stored_value_is_dropped() {
        let mut session = GameSession::new(fixed_timing());
        let t0 = Instant::now();
        let armed_time = arm(&mut session, t0);
        session.on_trigger(armed_time + Duration::from_millis(150));

        assert_eq!(session.absorb_loaded_best(Some(400)), None);
        assert_eq!(session.best_ms(), Some(150));
    }

    #[test]
    fn round_ms_rounds_to_nearest_millisecond() {
        assert_eq!(round_ms(Duration::from_micros(180_499)), 180);
        assert_eq!(round_ms(Duration::from_micros(180_501)), 181);
        assert_eq!(round_ms(Duration::ZERO), 0);
    }

    #[test]
    fn state_display_names() {
        assert_eq!(GameState::Idle.to_string(), "Idle");
        assert_eq!(GameState::Armed.to_string(), "Armed");
        assert_eq!(GameState::Penalty.to_string(), "Penalty");
    }
}
