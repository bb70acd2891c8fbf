//! Per-consumer scan lifecycle: debounce, coalescing, and reply correlation.
//!
//! At most one scan is in flight. Requests made while one is in flight, or
//! within the debounce window of the last send or completion, collapse into a
//! single pending slot where the latest context wins. [`ScanScheduler::poll`]
//! issues that pending scan once the scheduler is free again.

use std::time::{Duration, Instant};

use craftscan_common::{ContextKey, ScanId};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Lifecycle phase of the consumer's scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    /// Nothing requested
    #[default]
    Idle,
    /// A scan is queued and waits for the scheduler
    Requested,
    /// A scan is out and unanswered
    InFlight,
    /// The last scan was answered
    Completed,
    /// The last send failed
    Failed,
}

/// A scan to send now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTicket {
    /// Correlation id to put on the request
    pub scan_id: ScanId,
    /// Context the scan serves
    pub context: ContextKey,
}

/// What became of a scan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestDecision {
    /// Send this scan now
    Send(ScanTicket),
    /// Folded into the pending slot
    Queued,
}

#[derive(Debug)]
struct SchedulerState {
    phase: ScanPhase,
    next_id: ScanId,
    in_flight: Option<ScanId>,
    pending: Option<ContextKey>,
    last_activity: Option<Instant>,
}

/// Scan scheduler for one consumer.
#[derive(Debug)]
pub struct ScanScheduler {
    debounce: Duration,
    state: Mutex<SchedulerState>,
    registry: DashMap<ScanId, ContextKey>,
}

impl ScanScheduler {
    /// Creates a scheduler with the given debounce window.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            state: Mutex::new(SchedulerState {
                phase: ScanPhase::Idle,
                next_id: ScanId::first(),
                in_flight: None,
                pending: None,
                last_activity: None,
            }),
            registry: DashMap::new(),
        }
    }

    /// Debounce window in effect.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Asks for a scan of `context` at `now`.
    pub fn request(&self, context: ContextKey, now: Instant) -> RequestDecision {
        let mut state = self.state.lock();
        if state.in_flight.is_some() || self.debouncing(&state, now) {
            debug!("Coalescing scan request for {context}");
            state.pending = Some(context);
            if state.in_flight.is_none() {
                state.phase = ScanPhase::Requested;
            }
            return RequestDecision::Queued;
        }
        state.pending = None;
        RequestDecision::Send(self.issue(&mut state, context, now))
    }

    /// Issues the pending scan if the scheduler is free and outside the
    /// debounce window.
    pub fn poll(&self, now: Instant) -> Option<ScanTicket> {
        let mut state = self.state.lock();
        if state.in_flight.is_some() || self.debouncing(&state, now) {
            return None;
        }
        let context = state.pending.take()?;
        Some(self.issue(&mut state, context, now))
    }

    /// Parks `context` in the pending slot without sending, for callers that
    /// must hold scans back for a while.
    pub fn defer(&self, context: ContextKey) {
        let mut state = self.state.lock();
        state.pending = Some(context);
        if state.in_flight.is_none() {
            state.phase = ScanPhase::Requested;
        }
    }

    /// Allocates an id for a request that bypasses the in-flight slot, such
    /// as a fetch.
    pub fn register(&self, context: ContextKey) -> ScanTicket {
        let mut state = self.state.lock();
        let scan_id = state.next_id;
        state.next_id = scan_id.next();
        self.registry.insert(scan_id, context.clone());
        ScanTicket { scan_id, context }
    }

    /// Records the reply to `scan_id` and returns the context it answers.
    ///
    /// Unknown ids fall back to the most recently pending context.
    pub fn complete(&self, scan_id: ScanId, now: Instant) -> Option<ContextKey> {
        let mut state = self.state.lock();
        let context = self
            .registry
            .remove(&scan_id)
            .map(|(_, ctx)| ctx)
            .or_else(|| state.pending.clone());
        if state.in_flight == Some(scan_id) {
            state.in_flight = None;
            state.phase = ScanPhase::Completed;
            state.last_activity = Some(now);
        }
        context
    }

    /// Aborts a scan whose request could not be sent.
    pub fn send_failed(&self, scan_id: ScanId) {
        let mut state = self.state.lock();
        self.registry.remove(&scan_id);
        if state.in_flight == Some(scan_id) {
            warn!("Scan {scan_id} could not be sent, returning to idle");
            state.in_flight = None;
            state.pending = None;
            state.phase = ScanPhase::Idle;
        }
    }

    /// Forgets every scan and pending request.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.phase = ScanPhase::Idle;
        state.in_flight = None;
        state.pending = None;
        state.last_activity = None;
        self.registry.clear();
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        self.state.lock().phase
    }

    /// Id of the scan in flight, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<ScanId> {
        self.state.lock().in_flight
    }

    /// Checks if a scan is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Context waiting in the pending slot.
    #[must_use]
    pub fn pending(&self) -> Option<ContextKey> {
        self.state.lock().pending.clone()
    }

    fn debouncing(&self, state: &SchedulerState, now: Instant) -> bool {
        state
            .last_activity
            .is_some_and(|last| now.saturating_duration_since(last) < self.debounce)
    }

    fn issue(&self, state: &mut SchedulerState, context: ContextKey, now: Instant) -> ScanTicket {
        let scan_id = state.next_id;
        state.next_id = scan_id.next();
        state.in_flight = Some(scan_id);
        state.phase = ScanPhase::InFlight;
        state.last_activity = Some(now);
        self.registry.insert(scan_id, context.clone());
        ScanTicket { scan_id, context }
    }
}

impl Default for ScanScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ctx(name: &str) -> ContextKey {
        ContextKey::new(name)
    }

    #[test]
    fn test_first_request_sends() {
        let sched = ScanScheduler::default();
        let t0 = Instant::now();
        let RequestDecision::Send(ticket) = sched.request(ctx("craftableTab"), t0) else {
            panic!("first request must send");
        };
        assert_eq!(ticket.scan_id, ScanId::first());
        assert_eq!(sched.phase(), ScanPhase::InFlight);
        assert_eq!(sched.complete(ticket.scan_id, t0 + ms(50)), Some(ctx("craftableTab")));
        assert_eq!(sched.phase(), ScanPhase::Completed);
    }

    #[test]
    fn test_requests_during_flight_yield_one_follow_up() {
        let sched = ScanScheduler::default();
        let t0 = Instant::now();
        let RequestDecision::Send(first) = sched.request(ctx("craftableTab"), t0) else {
            panic!("first request must send");
        };
        assert_eq!(sched.request(ctx("craftableTab"), t0 + ms(100)), RequestDecision::Queued);
        assert_eq!(sched.request(ctx("woodTab"), t0 + ms(200)), RequestDecision::Queued);
        assert!(sched.poll(t0 + ms(250)).is_none());

        sched.complete(first.scan_id, t0 + ms(300));
        assert!(sched.poll(t0 + ms(400)).is_none());
        let follow_up = sched.poll(t0 + ms(700)).expect("one follow-up");
        assert_eq!(follow_up.context, ctx("woodTab"));
        assert!(sched.poll(t0 + ms(800)).is_none());

        sched.complete(follow_up.scan_id, t0 + ms(900));
        assert!(sched.poll(t0 + ms(2000)).is_none());
    }

    #[test]
    fn test_debounce_after_completion() {
        let sched = ScanScheduler::new(ms(400));
        let t0 = Instant::now();
        let RequestDecision::Send(first) = sched.request(ctx("allTab"), t0) else {
            panic!("first request must send");
        };
        sched.complete(first.scan_id, t0 + ms(10));
        assert_eq!(sched.request(ctx("allTab"), t0 + ms(100)), RequestDecision::Queued);
        assert_eq!(sched.phase(), ScanPhase::Requested);
        assert!(matches!(sched.request(ctx("allTab"), t0 + ms(500)), RequestDecision::Send(_)));
        assert!(sched.pending().is_none());
    }

    #[test]
    fn test_send_failure_returns_to_idle() {
        let sched = ScanScheduler::default();
        let t0 = Instant::now();
        let RequestDecision::Send(ticket) = sched.request(ctx("modTab"), t0) else {
            panic!("first request must send");
        };
        sched.request(ctx("modTab"), t0 + ms(10));
        sched.send_failed(ticket.scan_id);
        assert_eq!(sched.phase(), ScanPhase::Idle);
        assert!(!sched.is_busy());
        assert!(sched.pending().is_none());
    }

    #[test]
    fn test_unknown_reply_uses_pending_context() {
        let sched = ScanScheduler::default();
        let t0 = Instant::now();
        let RequestDecision::Send(_) = sched.request(ctx("stoneTab"), t0) else {
            panic!("first request must send");
        };
        sched.request(ctx("woodTab"), t0 + ms(5));
        assert_eq!(sched.complete(ScanId::NONE, t0 + ms(20)), Some(ctx("woodTab")));
        assert!(sched.is_busy());
    }

    #[test]
    fn test_deferred_context_issued_by_poll() {
        let sched = ScanScheduler::default();
        sched.defer(ctx("woodTab"));
        assert_eq!(sched.phase(), ScanPhase::Requested);
        let ticket = sched.poll(Instant::now()).expect("deferred scan");
        assert_eq!(ticket.context, ctx("woodTab"));
        assert_eq!(sched.phase(), ScanPhase::InFlight);
    }

    #[test]
    fn test_registered_ids_do_not_block_scans() {
        let sched = ScanScheduler::default();
        let fetch = sched.register(ctx("craftableTab"));
        assert!(!sched.is_busy());
        let RequestDecision::Send(scan) = sched.request(ctx("craftableTab"), Instant::now()) else {
            panic!("scan must send");
        };
        assert_ne!(scan.scan_id, fetch.scan_id);
        assert_eq!(sched.complete(fetch.scan_id, Instant::now()), Some(ctx("craftableTab")));
        assert!(sched.is_busy());
    }
}
