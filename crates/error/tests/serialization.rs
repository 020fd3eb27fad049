use eventide_error::{ErrorCode, ErrorContext, EventideError};
use serde_json::Value;

#[test]
fn test_json_serialization() {
    let error = EventideError::new(ErrorCode::UnknownStatistic, "Statistic 'averge' not known")
        .with_context(ErrorContext::InvalidParameter {
            parameter: "statistic".to_string(),
            value: "averge".to_string(),
            allowed: vec!["avg".to_string(), "count".to_string()],
        })
        .with_hint("Did you mean 'avg'?");

    let json = error.to_json();

    let v: Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(v["code"], "EVENTIDE-1005");
    assert_eq!(v["message"], "Statistic 'averge' not known");
    assert_eq!(v["hint"], "Did you mean 'avg'?");
    assert_eq!(v["context"]["type"], "invalid_parameter");
    assert_eq!(v["context"]["parameter"], "statistic");
}

#[test]
fn test_error_code_parsing() {
    let code: ErrorCode = "EVENTIDE-3002".to_string().try_into().unwrap();
    assert_eq!(code, ErrorCode::NotCacheable);
}

#[test]
fn test_error_roundtrip() {
    let error = EventideError::new(ErrorCode::MissingDates, "3 of 7 calendar dates missing")
        .with_context(ErrorContext::MissingDates {
            table: "events.calls".to_string(),
            requested: 7,
            present: 4,
            earliest_present: Some("2016-01-01".to_string()),
            latest_present: Some("2016-01-05".to_string()),
        });

    let json = error.to_json();
    let back: EventideError = serde_json::from_str(&json).unwrap();
    assert_eq!(back.code, ErrorCode::MissingDates);
    assert_eq!(back.message, error.message);
}
