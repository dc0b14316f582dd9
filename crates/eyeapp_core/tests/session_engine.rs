use chrono::{TimeZone, Utc};
use eyeapp_core::db::open_db_in_memory;
use eyeapp_core::{
    ManualClock, NewPatient, Patient, Protocol, Registry, SessionEngine, SessionState,
    SessionSummary, SlideMark, SqliteSnapshotRepository,
};

fn protocol(slides: usize) -> Protocol {
    Protocol {
        label: "Saccades".to_string(),
        slides: (0..slides).map(|i| format!("slides/s{i}.png")).collect(),
    }
}

fn patient() -> Patient {
    Patient {
        id: "internal-id".to_string(),
        code: "P-7G2Q".to_string(),
        initials: Some("JD".to_string()),
        birth_year: Some(1970),
        notes: Some("private".to_string()),
        created_at: "2023-12-31T09:00:00.000Z".to_string(),
    }
}

fn engine() -> (SessionEngine<ManualClock>, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    (SessionEngine::with_clock(clock.clone()), clock)
}

fn slides_of(marks: &[SlideMark]) -> Vec<usize> {
    marks.iter().map(|mark| mark.slide).collect()
}

#[test]
fn fresh_session_has_single_start_mark() {
    let (mut engine, _clock) = engine();
    let patient = patient();

    assert!(engine.start_session(Some(&patient), "saccades", &protocol(5)));

    assert_eq!(engine.state(), SessionState::Running);
    assert_eq!(engine.slide_index(), 0);
    assert_eq!(engine.marks(), &[SlideMark { slide: 0, t: 0.0 }]);
    assert_eq!(engine.session_id(), Some("sess-20240101_120000000Z"));
    assert_eq!(engine.current_slide(), Some("slides/s0.png"));
}

#[test]
fn start_without_patient_is_ignored() {
    let (mut engine, _clock) = engine();

    assert!(!engine.start_session(None, "saccades", &protocol(5)));
    assert_eq!(engine.state(), SessionState::Idle);
    assert!(engine.marks().is_empty());
}

#[test]
fn start_with_empty_protocol_is_ignored() {
    let (mut engine, _clock) = engine();
    let patient = patient();

    assert!(!engine.start_session(Some(&patient), "empty", &protocol(0)));
    assert_eq!(engine.state(), SessionState::Idle);
}

#[test]
fn start_while_running_keeps_current_session() {
    let (mut engine, clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(5));
    clock.advance_ms(250.0);
    engine.next();

    clock.advance_ms(1000.0);
    assert!(!engine.start_session(Some(&patient), "saccades", &protocol(5)));

    assert_eq!(engine.session_id(), Some("sess-20240101_120000000Z"));
    assert_eq!(slides_of(engine.marks()), vec![0, 1]);
    assert_eq!(engine.slide_index(), 1);
}

#[test]
fn navigation_records_marks_on_real_changes() {
    let (mut engine, clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(5));

    for _ in 0..3 {
        clock.advance_ms(100.0);
        assert!(engine.next());
    }
    clock.advance_ms(100.0);
    assert!(engine.prev());

    assert_eq!(engine.slide_index(), 2);
    assert_eq!(slides_of(engine.marks()), vec![0, 1, 2, 3, 2]);
    let times: Vec<f64> = engine.marks().iter().map(|mark| mark.t).collect();
    assert_eq!(times, vec![0.0, 100.0, 200.0, 300.0, 400.0]);
}

#[test]
fn navigation_is_clamped_at_both_ends() {
    let (mut engine, _clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(3));

    assert!(!engine.prev());
    assert_eq!(engine.marks().len(), 1);

    for _ in 0..10 {
        engine.next();
        assert!(engine.slide_index() <= 2);
    }
    assert_eq!(engine.slide_index(), 2);
    assert_eq!(slides_of(engine.marks()), vec![0, 1, 2]);
}

#[test]
fn preview_navigation_does_not_record_marks() {
    let (mut engine, _clock) = engine();
    assert!(engine.select_protocol("saccades", &protocol(4)));

    assert!(engine.next());
    assert_eq!(engine.slide_index(), 1);
    assert_eq!(engine.state(), SessionState::Idle);
    assert!(engine.marks().is_empty());
}

#[test]
fn select_protocol_is_ignored_while_running() {
    let (mut engine, _clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(4));

    assert!(!engine.select_protocol("fixation", &protocol(2)));
    assert_eq!(engine.protocol_key(), Some("saccades"));
    assert_eq!(engine.slide_count(), 4);
}

#[test]
fn end_session_derives_durations_and_emits_summary() {
    let (mut engine, clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(3));
    clock.advance_ms(1000.0);
    engine.next();
    clock.advance_ms(1500.0);
    engine.next();
    clock.advance_ms(500.0);

    let mut sink: Vec<SessionSummary> = Vec::new();
    assert!(engine.end_session(&mut sink).unwrap());

    assert_eq!(engine.state(), SessionState::Ended);
    let export = engine.last_export().unwrap();
    assert_eq!(export.durations, vec![1000, 1500, 500]);
    assert_eq!(export.durations.len(), export.marks.len());
    assert_eq!(export.started_at, "2024-01-01T12:00:00.000Z");
    assert_eq!(export.ended_at, "2024-01-01T12:00:03.000Z");
    assert_eq!(export.total_slides, 3);
    assert_eq!(export.protocol_label, "Saccades");
    assert_eq!(export.patient_code.as_deref(), Some("P-7G2Q"));

    assert_eq!(
        sink,
        vec![SessionSummary {
            id: "sess-20240101_120000000Z".to_string(),
            patient_id: "internal-id".to_string(),
            protocol_key: "saccades".to_string(),
            started_at: "2024-01-01T12:00:00.000Z".to_string(),
            ended_at: Some("2024-01-01T12:00:03.000Z".to_string()),
        }]
    );
}

#[test]
fn double_end_is_ignored() {
    let (mut engine, _clock) = engine();
    let patient = patient();
    let mut sink: Vec<SessionSummary> = Vec::new();

    assert!(!engine.end_session(&mut sink).unwrap());

    engine.start_session(Some(&patient), "saccades", &protocol(3));
    assert!(engine.end_session(&mut sink).unwrap());
    assert!(!engine.end_session(&mut sink).unwrap());
    assert_eq!(sink.len(), 1);
}

#[test]
fn navigation_after_end_does_not_record_marks() {
    let (mut engine, _clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(3));
    engine.end_session(&mut Vec::<SessionSummary>::new()).unwrap();

    engine.next();
    assert_eq!(engine.marks().len(), 1);
    assert_eq!(engine.last_export().unwrap().marks.len(), 1);
}

#[test]
fn clear_session_returns_to_idle() {
    let (mut engine, _clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(3));
    engine.next();
    engine.end_session(&mut Vec::<SessionSummary>::new()).unwrap();

    engine.clear_session();

    assert_eq!(engine.state(), SessionState::Idle);
    assert!(engine.marks().is_empty());
    assert!(engine.last_export().is_none());
    assert!(engine.session_id().is_none());
    assert_eq!(engine.slide_index(), 0);
}

#[test]
fn restart_after_end_starts_fresh_session() {
    let (mut engine, clock) = engine();
    let patient = patient();
    engine.start_session(Some(&patient), "saccades", &protocol(3));
    engine.next();
    engine.end_session(&mut Vec::<SessionSummary>::new()).unwrap();

    clock.advance_ms(60_000.0);
    assert!(engine.start_session(Some(&patient), "saccades", &protocol(3)));

    assert_eq!(engine.session_id(), Some("sess-20240101_120100000Z"));
    assert_eq!(engine.marks(), &[SlideMark { slide: 0, t: 0.0 }]);
    assert!(engine.last_export().is_none());
}

#[test]
fn ended_session_is_committed_to_registry() {
    let conn = open_db_in_memory().unwrap();
    let mut registry = Registry::open(SqliteSnapshotRepository::new(&conn));
    let patient = registry.add_patient(NewPatient::default()).unwrap();

    let (mut engine, clock) = engine();
    let selected = registry.resolve_selection(Some(patient.id.as_str())).cloned();
    engine.start_session(selected.as_ref(), "saccades", &protocol(2));
    clock.advance_ms(42.0);
    engine.end_session(&mut registry).unwrap();

    let sessions = registry.list_sessions(&patient.id);
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "sess-20240101_120000000Z");
    assert_eq!(sessions[0].protocol_key, "saccades");
}

#[test]
fn registry_rejection_still_ends_session() {
    let conn = open_db_in_memory().unwrap();
    let mut registry = Registry::open(SqliteSnapshotRepository::new(&conn));

    let (mut engine, _clock) = engine();
    let unknown = patient();
    engine.start_session(Some(&unknown), "saccades", &protocol(2));

    assert!(engine.end_session(&mut registry).is_err());
    assert_eq!(engine.state(), SessionState::Ended);
    assert!(engine.last_export().is_some());
}
