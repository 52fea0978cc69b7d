//! End-to-end episode scenarios driven through the public API.

use chrono::Utc;
use detection::{
    fuse, parse_inbound, Assessment, ClassifierScore, ControlCommand, DetectionPolicy, Effect,
    Evidence, FusionWeights, InboundMessage, Input, RiskMachine, RiskState, ScoreSource,
};

fn feed(sm: &mut RiskMachine, payload: &str) -> Vec<Effect> {
    match parse_inbound(payload.as_bytes(), Utc::now()).unwrap() {
        InboundMessage::Telemetry(reading) => sm.apply(&Input::Reading(reading)).unwrap(),
        InboundMessage::Control(ControlCommand::Reset) => sm.apply(&Input::Reset).unwrap(),
    }
}

fn count_captures(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::CaptureEvidence { .. }))
        .count()
}

fn count_notifies(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::Notify { .. }))
        .count()
}

#[test]
fn scenario_a_risk_then_recovery_with_single_capture() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    let policy = DetectionPolicy {
        t_max: 45.0,
        l_max: 2000.0,
        n_risk: 5,
        n_recover: 5,
        ..Default::default()
    };
    let mut sm = RiskMachine::new(policy);
    let mut captures = 0;

    for _ in 0..5 {
        captures += count_captures(&feed(&mut sm, r#"{"temp": 50, "hum": 30, "luz": 100}"#));
    }
    assert_eq!(sm.state(), RiskState::Risk);

    for _ in 0..5 {
        captures += count_captures(&feed(&mut sm, r#"{"temp": 20, "hum": 30, "luz": 100}"#));
    }
    assert_eq!(sm.state(), RiskState::Normal);
    assert_eq!(captures, 1);
}

#[test]
fn scenario_b_image_dominant_fusion() {
    let result = fuse(0.7, 0.0, &FusionWeights::new(0.9, 0.1, 0.6));
    assert!((result.score - 0.63).abs() < 1e-9);
    assert!(result.decided);
}

#[test]
fn scenario_c_failed_audio_classifier_degrades_to_zero() {
    let image = ClassifierScore::new(ScoreSource::Image, 0.5);
    let audio = ClassifierScore::from_result(ScoreSource::Audio, Err::<f64, _>("timeout"));
    let assessment = Assessment::new(
        Evidence::new(Some("shot.jpg".into()), None, Utc::now()),
        image,
        audio,
        &FusionWeights::new(0.7, 0.3, 0.6),
    );
    assert!((assessment.fusion.score - 0.35).abs() < 1e-9);
    assert!(!assessment.fusion.decided);
}

#[test]
fn scenario_d_confirmed_notifies_once_until_reset() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let mut sm = RiskMachine::new(DetectionPolicy::default());
    for _ in 0..5 {
        feed(&mut sm, r#"{"temp": 20, "hum": 30, "r": 900, "g": 900, "b": 900}"#);
    }
    assert_eq!(sm.state(), RiskState::Risk);

    let effects = feed(&mut sm, r#"{"temp": 20, "hum": 30, "luz": 2500}"#);
    assert_eq!(count_captures(&effects), 1);

    let episode = sm.context().episode;
    sm.apply(&Input::FusionCompleted {
        episode,
        assessment: Assessment::new(
            Evidence::new(Some("shot.jpg".into()), Some("clip.wav".into()), Utc::now()),
            ClassifierScore::new(ScoreSource::Image, 0.8),
            ClassifierScore::new(ScoreSource::Audio, 0.4),
            &FusionWeights::default(),
        ),
    })
    .unwrap();
    assert_eq!(sm.state(), RiskState::Confirmed);

    let mut notifications = 0;
    for _ in 0..10 {
        notifications += count_notifies(&feed(&mut sm, r#"{"temp": 20, "hum": 60, "luz": 10}"#));
    }
    assert_eq!(notifications, 1);
    assert_eq!(sm.state(), RiskState::Confirmed);

    feed(&mut sm, r#"{"command": "reset"}"#);
    assert_eq!(sm.state(), RiskState::Normal);
    assert!(!sm.context().alert_sent);
}

#[test]
fn invalid_payloads_leave_context_untouched() {
    let mut sm = RiskMachine::new(DetectionPolicy::default());
    feed(&mut sm, r#"{"temp": 50, "hum": 30, "luz": 100}"#);
    let before = sm.context().clone();

    for payload in [
        r#"{"hum": 30, "luz": 100}"#,
        r#"{"temp": 50, "luz": 100}"#,
        r#"{"temp": 50, "hum": 30, "r": 1}"#,
        "garbage",
    ] {
        assert!(parse_inbound(payload.as_bytes(), Utc::now()).is_err());
    }
    assert_eq!(sm.context(), &before);
}

#[test]
fn threshold_equality_is_not_risk() {
    let mut sm = RiskMachine::new(DetectionPolicy::default());
    for _ in 0..20 {
        feed(&mut sm, r#"{"temp": 45, "hum": 30, "luz": 2000}"#);
    }
    assert_eq!(sm.state(), RiskState::Normal);
    assert_eq!(sm.context().risk_streak, 0);
}
