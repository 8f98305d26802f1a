use ladewerk::error::LadewerkError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        LadewerkError::config("x"),
        LadewerkError::Config { .. }
    ));
    assert!(matches!(
        LadewerkError::telemetry("x"),
        LadewerkError::Telemetry { .. }
    ));
    assert!(matches!(
        LadewerkError::geocoding("x"),
        LadewerkError::Geocoding { .. }
    ));
    assert!(matches!(
        LadewerkError::calendar("x"),
        LadewerkError::Calendar { .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    assert!(matches!(
        LadewerkError::planning("x"),
        LadewerkError::Planning { .. }
    ));
    assert!(matches!(LadewerkError::io("x"), LadewerkError::Io { .. }));
    assert!(matches!(
        LadewerkError::network("x"),
        LadewerkError::Network { .. }
    ));
    assert!(matches!(
        LadewerkError::validation("f", "m"),
        LadewerkError::Validation { .. }
    ));
    assert!(matches!(
        LadewerkError::generic("x"),
        LadewerkError::Generic { .. }
    ));
}

#[test]
fn error_messages_and_conversions() {
    let err = LadewerkError::validation("charge_mode", "Turbo");
    assert_eq!(err.to_string(), "Validation error: charge_mode - Turbo");

    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    assert!(matches!(LadewerkError::from(io), LadewerkError::Io { .. }));

    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(matches!(
        LadewerkError::from(json),
        LadewerkError::Serialization { .. }
    ));
}
