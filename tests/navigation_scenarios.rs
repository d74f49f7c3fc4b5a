//! End-to-end navigation scenarios.
//!
//! Exercises the public API the way a host app does: plan a route, start a
//! session, feed positions, stop and check what was learned.
//!
//! Run with: `cargo test --test navigation_scenarios`

use std::sync::Arc;

use route_intel::geo_utils::offset_point;
use route_intel::{
    AlertConfig, AlertLevel, BoundingBox, BumpSeverity, CameraKind, ConditionKind,
    ConditionSeverity, EngineConfig, GeoPoint, Hazard, HazardEvaluator, LearningConfig,
    MergeOutcome, NavigationSession, RoadCondition, RouteCandidate, RouteEngine, RouteIntelError,
    RouteKind, RouteLearningAccumulator, SessionStatus, SpeedBump, SpeedCamera,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn origin() -> GeoPoint {
    GeoPoint::new(35.700, 51.400)
}

fn destination() -> GeoPoint {
    GeoPoint::new(35.710, 51.410)
}

/// A straight observed trip between two places.
fn observed_trip(id: &str, from: GeoPoint, to: GeoPoint, success_rate: f64) -> RouteCandidate {
    let distance = from.distance_to(&to);
    RouteCandidate {
        id: id.to_string(),
        origin: from,
        destination: to,
        waypoints: vec![from, to],
        distance_meters: distance,
        duration_seconds: distance / 10.0,
        kind: RouteKind::Driving,
        confidence: 0.5,
        usage_count: 1,
        success_rate,
        last_used_at: 1_700_000_000_000,
    }
}

fn camera_at(location: GeoPoint) -> Hazard {
    Hazard::SpeedCamera(SpeedCamera {
        location,
        speed_limit_kph: 60.0,
        kind: CameraKind::Fixed,
        active: true,
    })
}

// ============================================================================
// Route selection
// ============================================================================

#[test]
fn test_cached_route_is_returned() {
    init_logging();
    let engine = RouteEngine::default();
    engine
        .store()
        .merge(observed_trip("learned-home-work", origin(), destination(), 1.0))
        .unwrap();

    // Request endpoints a little off the stored ones, still within 500 m
    let near_origin = offset_point(&origin(), 120.0, -80.0);
    let near_destination = offset_point(&destination(), -60.0, 150.0);
    let route = engine
        .plan_route(near_origin, near_destination, RouteKind::Driving, None)
        .unwrap();
    assert_eq!(route.id, "learned-home-work");

    // Other travel modes don't share the cache
    let walking = engine
        .plan_route(origin(), destination(), RouteKind::Walking, None)
        .unwrap();
    assert_ne!(walking.id, "learned-home-work");
}

#[test]
fn test_merge_counts_each_trip_once() {
    let engine = RouteEngine::default();
    let store = engine.store();

    let first = store
        .merge(observed_trip("a", origin(), destination(), 1.0))
        .unwrap();
    assert!(matches!(first, MergeOutcome::Inserted(_)));

    let shifted = observed_trip(
        "b",
        offset_point(&origin(), 50.0, 50.0),
        offset_point(&destination(), -50.0, 0.0),
        0.0,
    );
    let merged = store.merge(shifted).unwrap().into_candidate();
    assert_eq!(merged.id, "a");
    assert_eq!(merged.usage_count, 2);
    assert!((0.0..=1.0).contains(&merged.success_rate));
    assert!((0.0..=1.0).contains(&merged.confidence));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_endpoint_scenario() {
    init_logging();
    let engine = RouteEngine::default();
    let route = engine
        .plan_route(origin(), destination(), RouteKind::Driving, None)
        .unwrap();

    let straight = origin().distance_to(&destination());
    assert!(route.validate(500.0).is_ok());
    assert_eq!(route.waypoints[0], origin());
    assert_eq!(route.waypoints[route.waypoints.len() - 1], destination());
    assert!(route.distance_meters >= straight * 0.99);
    assert!(route.duration_seconds > 0.0);
    assert_eq!(route.usage_count, 1);

    let alternatives = engine
        .selector()
        .alternatives(origin(), destination(), RouteKind::Driving, None)
        .unwrap();
    assert!((3..=5).contains(&alternatives.len()));
    // Best first
    assert!(alternatives.windows(2).all(|w| w[0].0 >= w[1].0));
}

#[test]
fn test_degenerate_request_rejected() {
    let engine = RouteEngine::default();
    let almost_there = offset_point(&origin(), 100.0, 100.0);
    let result = engine.start_navigation(origin(), almost_there, RouteKind::Driving, None);
    assert!(matches!(
        result,
        Err(RouteIntelError::DegenerateRequest { .. })
    ));

    let bad = GeoPoint::new(95.0, 51.4);
    assert!(matches!(
        engine.plan_route(bad, destination(), RouteKind::Driving, None),
        Err(RouteIntelError::InvalidCoordinates { .. })
    ));
}

// ============================================================================
// Hazards
// ============================================================================

#[test]
fn test_bounding_box_query_containment() {
    let engine = RouteEngine::default();
    let catalog = engine.catalog();

    let inside = [
        GeoPoint::new(35.701, 51.401),
        GeoPoint::new(35.705, 51.405),
        GeoPoint::new(35.709, 51.409),
    ];
    let outside = [GeoPoint::new(35.750, 51.400), GeoPoint::new(35.705, 51.300)];
    for p in inside.iter().chain(outside.iter()) {
        catalog.insert(camera_at(*p)).unwrap();
    }
    catalog
        .insert(Hazard::SpeedBump(SpeedBump {
            location: GeoPoint::new(35.7045, 51.4045),
            severity: BumpSeverity::High,
            warning_distance_meters: 100.0,
        }))
        .unwrap();

    let bounds = BoundingBox::from_points(&[origin(), destination()]).unwrap();
    let found = catalog.query_bounding_box(&bounds);
    assert_eq!(found.len(), 4);
    assert!(found.iter().all(|r| bounds.contains(&r.hazard.location())));
}

#[test]
fn test_severity_never_drops_while_approaching() {
    let evaluator = HazardEvaluator::new(AlertConfig::default());
    let hazards = [
        camera_at(origin()),
        Hazard::SpeedBump(SpeedBump {
            location: origin(),
            severity: BumpSeverity::Medium,
            warning_distance_meters: 150.0,
        }),
        Hazard::RoadCondition(RoadCondition {
            location: origin(),
            condition: ConditionKind::Construction,
            severity: ConditionSeverity::Medium,
            length_meters: 400.0,
            description: String::new(),
        }),
    ];

    for hazard in &hazards {
        for speed in [20.0, 45.0, 90.0] {
            let mut previous: Option<AlertLevel> = None;
            let mut distance = 1_000.0;
            while distance >= 0.0 {
                let level = evaluator.level(hazard, distance, speed, 12);
                assert!(
                    level >= previous,
                    "{:?} dropped from {:?} to {:?} at {}m",
                    hazard.kind(),
                    previous,
                    level,
                    distance
                );
                previous = level;
                distance -= 5.0;
            }
            assert!(previous.is_some());
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn test_cooldown_suppresses_repeats() {
    init_logging();
    let engine = RouteEngine::default();
    let camera = GeoPoint::new(35.705, 51.405);
    engine.catalog().insert(camera_at(camera)).unwrap();

    let session = engine
        .start_navigation(origin(), destination(), RouteKind::Driving, None)
        .unwrap();
    assert_eq!(session.snapshot_len(), 1);

    let approach = offset_point(&camera, 0.0, -150.0);
    let first = session.on_position(approach, 50.0, 1_000_000);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].level, AlertLevel::Warning);

    let repeat = session.on_position(approach, 50.0, 1_001_000);
    assert!(repeat.is_empty());

    let after_window = session.on_position(approach, 50.0, 1_031_000);
    assert_eq!(after_window.len(), 1);
}

#[test]
fn test_escalation_passes_cooldown() {
    let engine = RouteEngine::default();
    let camera = GeoPoint::new(35.705, 51.405);
    engine.catalog().insert(camera_at(camera)).unwrap();
    let session = engine
        .start_navigation(origin(), destination(), RouteKind::Driving, None)
        .unwrap();

    let far = session.on_position(offset_point(&camera, 0.0, -150.0), 80.0, 0);
    assert_eq!(far[0].level, AlertLevel::Warning);
    let near = session.on_position(offset_point(&camera, 0.0, -30.0), 80.0, 2_000);
    assert_eq!(near.len(), 1);
    assert_eq!(near[0].level, AlertLevel::Critical);
}

#[test]
fn test_full_trip_is_learned() {
    init_logging();
    let engine = RouteEngine::new(EngineConfig::default()).unwrap();
    let session = engine
        .start_navigation(origin(), destination(), RouteKind::Driving, None)
        .unwrap();
    let route = session.route().unwrap();
    for (i, p) in route.waypoints.iter().enumerate() {
        session.on_position(*p, 45.0, i as i64 * 15_000);
    }
    let learned = session.stop().unwrap();
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(learned.usage_count, 1);
    assert_eq!(learned.success_rate, 1.0);
    assert!(session.stop().is_none());

    // The next request comes straight from the cache
    let next = engine
        .plan_route(origin(), destination(), RouteKind::Driving, None)
        .unwrap();
    assert_eq!(next.id, learned.id);
}

#[test]
fn test_sessions_share_stores_across_threads() {
    init_logging();
    let engine = Arc::new(RouteEngine::default());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let session: NavigationSession = engine.new_session();
                let start = offset_point(&origin(), i as f64 * 10.0, 0.0);
                let end = offset_point(&destination(), i as f64 * 10.0, 0.0);
                session
                    .start(observed_trip(&format!("planned-{}", i), start, end, 1.0))
                    .unwrap();
                session.on_position(start, 40.0, 0);
                session.on_position(end, 40.0, 120_000);
                session.stop()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_some());
    }

    // Four trips between the same places collapse into one candidate
    let stats = engine.stats();
    assert_eq!(stats.route_count, 1);
    let cached = engine
        .store()
        .lookup(&origin(), &destination(), RouteKind::Driving)
        .unwrap();
    assert_eq!(cached.usage_count, 4);
}

#[test]
fn test_stop_races_with_position_updates() {
    init_logging();
    let engine = RouteEngine::default();
    engine.catalog().insert(camera_at(destination())).unwrap();
    let session = Arc::new(
        engine
            .start_navigation(origin(), destination(), RouteKind::Driving, None)
            .unwrap(),
    );
    let route = session.route().unwrap();
    for (i, p) in route.waypoints.iter().enumerate() {
        session.on_position(*p, 45.0, i as i64 * 15_000);
    }
    let arrived_at = route.waypoints.len() as i64 * 15_000;

    // Keep reporting fixes at the destination while another thread stops
    let feeder = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || {
            let mut late_alerts = 0;
            for i in 0..2_000 {
                let finished = session.status() == SessionStatus::Completed;
                let alerts = session.on_position(destination(), 30.0, arrived_at + i * 1_000);
                if finished && !alerts.is_empty() {
                    late_alerts += 1;
                }
            }
            late_alerts
        })
    };
    let stopper = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(2));
            (session.stop(), session.stop())
        })
    };

    let (first, second) = stopper.join().unwrap();
    assert_eq!(feeder.join().unwrap(), 0);
    assert!(first.is_some());
    assert!(second.is_none());
    assert!(session.stop().is_none());
    assert_eq!(session.status(), SessionStatus::Completed);

    // Exactly one merge reached the store
    let stored = engine.store().all_candidates();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].usage_count, 1);
    assert_eq!(stored[0].id, first.unwrap().id);
    assert!(session.on_position(destination(), 30.0, 0).is_empty());
}

// ============================================================================
// Learning
// ============================================================================

#[test]
fn test_accumulator_scenario() {
    let start = origin();
    let mut acc =
        RouteLearningAccumulator::new("trip", RouteKind::Cycling, LearningConfig::default());
    acc.record(start, 0, 15.0);
    acc.record(offset_point(&start, 0.0, 150.0), 10_000, 15.0);
    acc.record(offset_point(&start, 0.0, 300.0), 20_000, 15.0);

    let candidate = acc.finish().unwrap();
    assert!((candidate.distance_meters - 300.0).abs() < 3.0);
    assert_eq!(candidate.duration_seconds, 20.0);
    assert_eq!(candidate.confidence, 0.5);
    assert_eq!(candidate.usage_count, 1);
    assert_eq!(candidate.kind, RouteKind::Cycling);
}
