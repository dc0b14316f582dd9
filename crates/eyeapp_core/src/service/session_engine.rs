//! Slide-session timing engine.
//!
//! # Responsibility
//! - Drive the `Idle -> Running -> Ended` session lifecycle.
//! - Clamp slide navigation and timestamp every in-bounds slide change.
//! - Derive per-slide durations and the export document at session end.
//!
//! # Invariants
//! - A started session has `marks == [{slide: 0, t: 0}]` and index 0.
//! - The slide index stays within `[0, slide_count - 1]`.
//! - Marks are appended only while Running and only on a real index change.
//! - `durations.len() == marks.len()` and every duration is `>= 0`.
//! - `start_session` is rejected while a session is Running.
//! - Relative times come from the monotonic clock only.

use crate::export::{build_session_export, EndedSession, ProtocolMeta};
use crate::ids::{iso_timestamp, new_session_id};
use crate::model::patient::Patient;
use crate::model::protocol::Protocol;
use crate::model::session::{SessionExport, SessionSummary, SlideMark};
use crate::service::registry::RegistryResult;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Time source for session timing.
pub trait Clock {
    /// Current wall-clock instant, used for `startedAt`/`endedAt`.
    fn wall_now(&self) -> DateTime<Utc>;
    /// Milliseconds on a monotonic timeline with an arbitrary origin.
    fn monotonic_ms(&self) -> f64;
}

/// Process clock: `chrono` wall time plus `Instant` for relative marks.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock. Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    wall: Rc<Cell<DateTime<Utc>>>,
    elapsed_ms: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            wall: Rc::new(Cell::new(wall)),
            elapsed_ms: Rc::new(Cell::new(0.0)),
        }
    }

    /// Moves both timelines forward by `ms`.
    pub fn advance_ms(&self, ms: f64) {
        self.elapsed_ms.set(self.elapsed_ms.get() + ms);
        let step = chrono::Duration::microseconds((ms * 1000.0).round() as i64);
        self.wall.set(self.wall.get() + step);
    }
}

impl Clock for ManualClock {
    fn wall_now(&self) -> DateTime<Utc> {
        self.wall.get()
    }

    fn monotonic_ms(&self) -> f64 {
        self.elapsed_ms.get()
    }
}

/// Receives the summary emitted when a session ends.
pub trait SessionSink {
    fn record_session(&mut self, summary: SessionSummary) -> RegistryResult<()>;
}

impl SessionSink for Vec<SessionSummary> {
    fn record_session(&mut self, summary: SessionSummary) -> RegistryResult<()> {
        self.push(summary);
        Ok(())
    }
}

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Ended,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    id: String,
    patient: Patient,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    t0_ms: f64,
    marks: Vec<SlideMark>,
}

/// Per-stage session state machine.
pub struct SessionEngine<C: Clock = SystemClock> {
    clock: C,
    protocol_key: Option<String>,
    protocol: Option<Protocol>,
    slide_index: usize,
    session: Option<ActiveSession>,
    last_export: Option<SessionExport>,
}

impl SessionEngine<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for SessionEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SessionEngine<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            protocol_key: None,
            protocol: None,
            slide_index: 0,
            session: None,
            last_export: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Idle,
            Some(session) if session.ended_at.is_none() => SessionState::Running,
            Some(_) => SessionState::Ended,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Loads a protocol into the stage for preview.
    ///
    /// Ignored while Running. Resets the slide index to 0.
    pub fn select_protocol(&mut self, key: &str, protocol: &Protocol) -> bool {
        if self.is_running() {
            debug!("event=protocol_select module=session status=ignored reason=running");
            return false;
        }
        self.protocol_key = Some(key.to_string());
        self.protocol = Some(protocol.clone());
        self.slide_index = 0;
        true
    }

    /// Starts a timed session for `patient` on `protocol`.
    ///
    /// Returns `false` without changing state when no patient is selected,
    /// the protocol has no slides, or a session is already Running. An Ended
    /// session is discarded.
    pub fn start_session(
        &mut self,
        patient: Option<&Patient>,
        protocol_key: &str,
        protocol: &Protocol,
    ) -> bool {
        let Some(patient) = patient else {
            debug!("event=session_start module=session status=ignored reason=no_patient");
            return false;
        };
        if self.is_running() {
            debug!("event=session_start module=session status=ignored reason=running");
            return false;
        }
        if protocol.slide_count() == 0 {
            debug!("event=session_start module=session status=ignored reason=no_slides");
            return false;
        }

        let started_at = self.clock.wall_now();
        let id = new_session_id(started_at);
        self.protocol_key = Some(protocol_key.to_string());
        self.protocol = Some(protocol.clone());
        self.slide_index = 0;
        self.last_export = None;
        self.session = Some(ActiveSession {
            id: id.clone(),
            patient: patient.clone(),
            started_at,
            ended_at: None,
            t0_ms: self.clock.monotonic_ms(),
            marks: vec![SlideMark::START],
        });

        info!(
            "event=session_start module=session status=ok session_id={id} protocol={protocol_key} slides={}",
            protocol.slide_count()
        );
        true
    }

    /// Advances one slide. Returns whether the index changed.
    pub fn next(&mut self) -> bool {
        let count = self.slide_count();
        if count == 0 {
            return false;
        }
        let target = (self.slide_index + 1).min(count - 1);
        self.move_to(target)
    }

    /// Goes back one slide. Returns whether the index changed.
    pub fn prev(&mut self) -> bool {
        let target = self.slide_index.saturating_sub(1);
        self.move_to(target)
    }

    fn move_to(&mut self, target: usize) -> bool {
        if target == self.slide_index {
            return false;
        }
        self.slide_index = target;

        let now_ms = self.clock.monotonic_ms();
        if let Some(session) = self.session.as_mut().filter(|s| s.ended_at.is_none()) {
            session.marks.push(SlideMark {
                slide: target,
                t: now_ms - session.t0_ms,
            });
        }
        true
    }

    /// Ends the Running session and emits its summary to `sink`.
    ///
    /// Returns `Ok(false)` when no session is Running. When the sink fails
    /// the session is still Ended and its export remains available.
    pub fn end_session<S: SessionSink + ?Sized>(&mut self, sink: &mut S) -> RegistryResult<bool> {
        let now_ms = self.clock.monotonic_ms();
        let ended_at = self.clock.wall_now();
        let Some(session) = self.session.as_mut().filter(|s| s.ended_at.is_none()) else {
            debug!("event=session_end module=session status=ignored reason=not_running");
            return Ok(false);
        };
        session.ended_at = Some(ended_at);

        let ended = EndedSession {
            id: session.id.clone(),
            started_at: iso_timestamp(session.started_at),
            ended_at: iso_timestamp(ended_at),
            durations: derive_durations(&session.marks, now_ms - session.t0_ms),
            marks: session.marks.clone(),
        };
        let protocol_key = self.protocol_key.clone().unwrap_or_default();
        let (label, total_slides) = self
            .protocol
            .as_ref()
            .map_or((protocol_key.as_str(), 0), |protocol| {
                (protocol.label.as_str(), protocol.slide_count())
            });
        let export = build_session_export(
            &ended,
            Some(&session.patient),
            ProtocolMeta {
                key: &protocol_key,
                label,
                total_slides,
            },
        );
        let summary = SessionSummary {
            id: ended.id.clone(),
            patient_id: session.patient.id.clone(),
            protocol_key: protocol_key.clone(),
            started_at: ended.started_at.clone(),
            ended_at: Some(ended.ended_at.clone()),
        };

        info!(
            "event=session_end module=session status=ok session_id={} marks={}",
            ended.id,
            ended.marks.len()
        );
        self.last_export = Some(export);
        sink.record_session(summary)?;
        Ok(true)
    }

    /// Discards all in-memory session state and returns to Idle.
    pub fn clear_session(&mut self) {
        self.session = None;
        self.last_export = None;
        self.slide_index = 0;
    }

    pub fn slide_index(&self) -> usize {
        self.slide_index
    }

    pub fn slide_count(&self) -> usize {
        self.protocol.as_ref().map_or(0, Protocol::slide_count)
    }

    /// Image reference of the slide on stage, if any.
    pub fn current_slide(&self) -> Option<&str> {
        self.protocol
            .as_ref()
            .and_then(|protocol| protocol.slides.get(self.slide_index))
            .map(String::as_str)
    }

    pub fn protocol_key(&self) -> Option<&str> {
        self.protocol_key.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.id.as_str())
    }

    /// Marks of the current or last ended session; empty when Idle.
    pub fn marks(&self) -> &[SlideMark] {
        self.session
            .as_ref()
            .map(|session| session.marks.as_slice())
            .unwrap_or(&[])
    }

    /// Export document of the last ended session, if still held.
    pub fn last_export(&self) -> Option<&SessionExport> {
        self.last_export.as_ref()
    }
}

/// Derives per-mark durations in whole milliseconds.
///
/// Each mark lasts until the next one; the last lasts until
/// `end_elapsed_ms`. Negative spans are floored at 0.
pub fn derive_durations(marks: &[SlideMark], end_elapsed_ms: f64) -> Vec<u64> {
    marks
        .iter()
        .enumerate()
        .map(|(i, mark)| {
            let end = marks.get(i + 1).map_or(end_elapsed_ms, |next| next.t);
            (end - mark.t).max(0.0).round() as u64
        })
        .collect()
}
