#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Entity states arrive as arbitrary strings from the home automation side
    let reading = ladewerk::telemetry::Reading::from_state(text);
    let _ = reading.as_f64();
    let _ = reading.as_bool();
    let _ = reading.as_time();
    let _ = ladewerk::controls::VehicleState::parse(Some(text));
    let _ = text.parse::<ladewerk::controls::ChargeMode>();
    let _ = ladewerk::config::parse_hhmm(text);

    let filler = vec!["nach".to_string(), "zum".to_string()];
    let activity = vec!["sport".to_string()];
    let _ = ladewerk::trips::clean_destination(text, &filler, &activity);
});
