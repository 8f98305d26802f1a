use ladewerk::config::ConsumptionConfig;
use ladewerk::trips::ConsumptionTracker;

fn tracker() -> ConsumptionTracker {
    ConsumptionTracker::new(ConsumptionConfig::default(), 22.0, 77.0)
}

/// Drive `km` using `soc_drop` percent, starting at the tracker's last reading
fn drive(t: &mut ConsumptionTracker, odo: &mut f64, soc: &mut f64, km: f64, soc_drop: f64) {
    *odo += km;
    *soc -= soc_drop;
    t.observe(*odo, *soc);
}

#[test]
fn few_samples_lean_towards_default() {
    let mut t = tracker();
    let (mut odo, mut soc) = (5000.0, 90.0);
    t.observe(odo, soc);
    // 50 km at 10 % of 77 kWh = 15.4 kWh/100 km
    drive(&mut t, &mut odo, &mut soc, 50.0, 10.0);
    assert_eq!(t.sample_count(), 1);

    // One sample of five: 4/5 default, 1/5 measured
    let expected = 22.0 * 0.8 + 15.4 * 0.2;
    assert!((t.rate() - expected).abs() < 1e-9);
}

#[test]
fn implausible_segments_are_discarded() {
    let mut t = tracker();
    t.observe(1000.0, 90.0);
    // 10 km for 20 % is 154 kWh/100 km
    assert!(t.observe(1010.0, 70.0).is_none());
    assert_eq!(t.sample_count(), 0);
    assert_eq!(t.rate(), 22.0);
}

#[test]
fn rate_is_clamped_and_history_bounded() {
    let config = ConsumptionConfig {
        max_samples: 3,
        trust_samples: 1,
        ..ConsumptionConfig::default()
    };
    let mut t = ConsumptionTracker::new(config, 22.0, 77.0);
    let (mut odo, mut soc) = (0.0, 100.0);
    t.observe(odo, soc);
    for _ in 0..5 {
        // 10.78 kWh/100 km, plausible but below the clamp
        drive(&mut t, &mut odo, &mut soc, 100.0, 14.0);
    }
    assert_eq!(t.sample_count(), 3);
    assert_eq!(t.rate(), 12.0);
}

#[test]
fn backwards_odometer_restarts_segment() {
    let mut t = tracker();
    t.observe(2000.0, 80.0);
    assert!(t.observe(1500.0, 70.0).is_none());
    assert_eq!(t.state().anchor.map(|a| a.mileage_km), Some(1500.0));
}
