use chrono::{TimeZone, Utc};
use eyeapp_core::{
    build_session_export, write_export, DirFileWriter, EndedSession, ManualClock, Patient,
    Protocol, ProtocolMeta, SessionEngine, SessionSummary, SlideMark,
};

fn patient() -> Patient {
    Patient {
        id: "internal-id-123".to_string(),
        code: "P-7G2Q".to_string(),
        initials: Some("JD".to_string()),
        birth_year: Some(1970),
        notes: Some("sensitive note".to_string()),
        created_at: "2023-12-31T09:00:00.000Z".to_string(),
    }
}

fn ended_session() -> EndedSession {
    EndedSession {
        id: "sess-20240101_120000000Z".to_string(),
        started_at: "2024-01-01T12:00:00.000Z".to_string(),
        ended_at: "2024-01-01T12:00:03.000Z".to_string(),
        marks: vec![
            SlideMark { slide: 0, t: 0.0 },
            SlideMark {
                slide: 1,
                t: 1000.0,
            },
            SlideMark {
                slide: 2,
                t: 2500.0,
            },
        ],
        durations: vec![1000, 1500, 500],
    }
}

const META: ProtocolMeta<'static> = ProtocolMeta {
    key: "saccades",
    label: "Saccades",
    total_slides: 3,
};

#[test]
fn export_carries_only_the_anonymous_code() {
    let patient = patient();
    let export = build_session_export(&ended_session(), Some(&patient), META);
    let value = serde_json::to_value(&export).unwrap();
    let object = value.as_object().unwrap();

    assert_eq!(object["patientCode"], "P-7G2Q");
    assert_eq!(object["id"], "sess-20240101_120000000Z");
    for forbidden in ["patientId", "initials", "birthYear", "notes"] {
        assert!(!object.contains_key(forbidden), "{forbidden} leaked");
    }

    let raw = serde_json::to_string(&export).unwrap();
    assert!(!raw.contains("internal-id-123"));
    assert!(!raw.contains("JD"));
    assert!(!raw.contains("sensitive note"));
    assert!(!raw.contains("1970"));
}

#[test]
fn export_document_has_expected_fields() {
    let export = build_session_export(&ended_session(), Some(&patient()), META);
    let value = serde_json::to_value(&export).unwrap();

    assert_eq!(value["protocolKey"], "saccades");
    assert_eq!(value["protocolLabel"], "Saccades");
    assert_eq!(value["totalSlides"], 3);
    assert_eq!(value["startedAt"], "2024-01-01T12:00:00.000Z");
    assert_eq!(value["endedAt"], "2024-01-01T12:00:03.000Z");
    assert_eq!(value["durations"], serde_json::json!([1000, 1500, 500]));
    assert_eq!(value["marks"][1]["slide"], 1);
    assert!(value["appBuild"].as_str().unwrap().ends_with("-desktop"));
}

#[test]
fn export_without_patient_omits_code() {
    let export = build_session_export(&ended_session(), None, META);
    let value = serde_json::to_value(&export).unwrap();
    assert!(value.get("patientCode").is_none());
}

#[test]
fn write_export_uses_derived_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DirFileWriter::new(dir.path().join("exports"));
    let export = build_session_export(&ended_session(), Some(&patient()), META);

    let path = write_export(&export, &mut writer).unwrap();

    assert_eq!(
        path,
        dir.path()
            .join("exports")
            .join("P-7G2Q_sess-20240101_120000000Z_saccades.json")
    );
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["patientCode"], "P-7G2Q");
    assert!(written.get("initials").is_none());
}

#[test]
fn engine_export_matches_recorded_session() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    let mut engine = SessionEngine::with_clock(clock.clone());
    let protocol = Protocol {
        label: "Saccades".to_string(),
        slides: vec!["a.png".into(), "b.png".into(), "c.png".into()],
    };
    let patient = patient();

    engine.start_session(Some(&patient), "saccades", &protocol);
    clock.advance_ms(1000.0);
    engine.next();
    clock.advance_ms(1500.0);
    engine.next();
    clock.advance_ms(500.0);
    let mut sink: Vec<SessionSummary> = Vec::new();
    engine.end_session(&mut sink).unwrap();

    let export = engine.last_export().unwrap();
    assert_eq!(export, &build_session_export(&ended_session(), Some(&patient), META));
}
