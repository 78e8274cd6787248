use smart_crossing::config::SimConfig;
use smart_crossing::geometry::Vec2;
use smart_crossing::pedestrian::{Pedestrian, PedestrianId};
use smart_crossing::vehicle::{SensingContext, Vehicle, VehicleId};
use smart_crossing::{Axis, Intersection, JunctionArbiter, Origin, Phase, QueueLengths, SignalAction, SignalController};

fn quiet_config() -> SimConfig {
    let mut cfg = SimConfig::default();
    cfg.spawn.vehicle_interval = 0;
    cfg.spawn.pedestrian_interval = 0;
    cfg.policy.enabled = false;
    cfg
}

/// Spawns a north-lane vehicle and parks it with its top edge at `y`.
fn north_vehicle_at(sim: &mut Intersection, y: f32, speed: f32) -> VehicleId {
    let id = sim.spawn_vehicle(Origin::North, false);
    let v = sim.vehicle_mut(id).unwrap();
    v.position = Vec2::new(v.position.x, y);
    v.current_speed = speed;
    id
}

#[test]
fn same_lane_arrivals_keep_first_come_first_served_order() {
    let mut sim = Intersection::new(quiet_config()).unwrap();
    let first = north_vehicle_at(&mut sim, 250.0, 3.0);
    let second = north_vehicle_at(&mut sim, 195.0, 3.0);

    for _ in 0..200 {
        sim.tick();
        let (Some(a), Some(b)) = (sim.vehicle(first), sim.vehicle(second)) else {
            break;
        };
        assert!(b.position.y < a.position.y, "later arrival overtook the earlier one");

        if let (Some(ra), Some(rb)) = (sim.arbiter().rank(first), sim.arbiter().rank(second)) {
            assert!(ra < rb);
        }
    }
}

#[test]
fn vehicles_beyond_the_admitted_ranks_must_stop() {
    let cfg = quiet_config();
    let signal = SignalController::new(&cfg.signal);
    let mut vehicles = Vec::new();
    for (i, origin) in [Origin::North, Origin::South, Origin::North].into_iter().enumerate() {
        vehicles.push(Vehicle::new(VehicleId(i as u64), origin, &cfg, false));
    }
    // Third vehicle far up the north lane, clear of its leader.
    vehicles[0].position.y = 250.0;
    vehicles[2].position.y = 100.0;

    let mut arbiter = JunctionArbiter::new(cfg.vehicle.admission_slots);
    let ctx = |arbiter: &JunctionArbiter, vehicles: &[Vehicle]| {
        vehicles[2].decide(&SensingContext {
            signal: Some(&signal),
            vehicles,
            pedestrians: &[],
            arbiter,
            cfg: &cfg,
        })
    };

    assert_eq!(ctx(&arbiter, &vehicles).rule_speed, cfg.vehicle.max_speed);
    for v in &vehicles {
        arbiter.register(v.id);
    }
    assert_eq!(ctx(&arbiter, &vehicles).rule_speed, 0.0);
}

#[test]
fn pedestrian_inside_halt_distance_forces_full_stop() {
    let mut sim = Intersection::new(quiet_config()).unwrap();
    let id = north_vehicle_at(&mut sim, 100.0, 0.0);
    // Vehicle center is (x + 10, 120); the pedestrian stands 20 units ahead of it.
    let cx = sim.vehicle(id).unwrap().bounds().center().x;
    sim.spawn_pedestrian_between(Vec2::new(cx, 140.0), Vec2::new(cx, 140.0));

    sim.tick();
    let v = sim.vehicle(id).unwrap();
    assert_eq!(v.target_speed, 0.0);
    assert!(v.stopped);
}

#[test]
fn prolonged_pedestrian_standoff_enters_ignore_mode_and_resumes() {
    let mut sim = Intersection::new(quiet_config()).unwrap();
    let id = north_vehicle_at(&mut sim, 100.0, 0.0);
    let cx = sim.vehicle(id).unwrap().bounds().center().x;
    sim.spawn_pedestrian_between(Vec2::new(cx, 140.0), Vec2::new(cx, 140.0));

    let threshold_ticks = (sim.config().vehicle.patience_threshold * sim.config().run.fps as f32) as usize;
    let mut entered = None;
    for t in 1..=threshold_ticks + 5 {
        sim.tick();
        let v = sim.vehicle(id).unwrap();
        if v.ignore_pedestrians {
            entered = Some(t);
            break;
        }
        assert_eq!(v.target_speed, 0.0);
    }
    let entered = entered.expect("vehicle never bypassed the standing pedestrian");
    assert!(entered >= threshold_ticks);

    sim.tick();
    assert!(sim.vehicle(id).unwrap().target_speed > 0.0);
}

#[test]
fn emergency_from_north_forces_north_south_green_immediately() {
    let cfg = quiet_config();
    let mut signal = SignalController::new(&cfg.signal);
    let cross = QueueLengths {
        north_south: 0,
        east_west: 5,
    };
    while signal.phase() != Phase::EwGreen {
        signal.update(cross);
    }

    signal.set_emergency_mode(true, Some(Origin::North));
    assert_eq!(signal.phase(), Phase::NsGreen);

    let ns_waiting = QueueLengths {
        north_south: 0,
        east_west: 9,
    };
    for _ in 0..1000 {
        assert_eq!(signal.update(ns_waiting), None);
        assert_eq!(signal.apply_action(SignalAction::Switch), None);
    }
    assert_eq!(signal.phase(), Phase::NsGreen);
}

#[test]
fn operator_emergency_overrides_signal_on_next_tick() {
    let mut sim = Intersection::new(quiet_config()).unwrap();
    let (_, origin) = sim.spawn_emergency_vehicle();
    assert!(!sim.signal().is_emergency());

    sim.tick();
    let snap = sim.snapshot();
    assert!(snap.emergency_override);
    assert_eq!(snap.phase, Phase::green_for(origin.axis()));
    assert_eq!(sim.metrics().emergency_spawned, 1);
}

#[test]
fn knocked_down_pedestrian_despawns_without_moving() {
    let cfg = quiet_config();
    let mut p = Pedestrian::new(
        PedestrianId(0),
        Vec2::new(280.0, 280.0),
        Vec2::new(520.0, 280.0),
        Axis::EastWest,
        Axis::NorthSouth,
        cfg.pedestrian.radius,
    );
    let mut signal = SignalController::new(&cfg.signal);
    signal.set_emergency_mode(true, Some(Origin::East));

    p.update(Some(&signal), 0.0, &cfg.pedestrian);
    assert!(p.moving);
    p.hit(0.5);
    let at = p.position;

    p.update(Some(&signal), 1.4, &cfg.pedestrian);
    assert!(!p.done);
    assert_eq!(p.position, at);
    p.update(Some(&signal), 1.6, &cfg.pedestrian);
    assert!(p.done);
    p.update(Some(&signal), 2.0, &cfg.pedestrian);
    assert_eq!(p.position, at);
}

#[test]
fn orchestrator_removes_knocked_down_pedestrians_after_despawn_time() {
    let mut sim = Intersection::new(quiet_config()).unwrap();
    let ped = sim.spawn_pedestrian_between(Vec2::new(280.0, 280.0), Vec2::new(520.0, 280.0));
    sim.pedestrian_mut(ped).unwrap().hit(0.0);

    let despawn_ticks = (sim.config().pedestrian.despawn_secs * sim.config().run.fps as f32) as usize;
    for _ in 0..despawn_ticks + 2 {
        sim.tick();
    }
    assert!(sim.pedestrians.is_empty());
    assert_eq!(sim.metrics().pedestrians_crossed, 0);
}

#[test]
fn cross_traffic_entering_the_box_together_both_clear_it() {
    let mut sim = Intersection::new(quiet_config()).unwrap();
    let west = sim.spawn_vehicle(Origin::West, false);
    let south = sim.spawn_vehicle(Origin::South, false);
    for (id, at) in [(west, Vec2::new(310.0, 430.0)), (south, Vec2::new(430.0, 305.0))] {
        let v = sim.vehicle_mut(id).unwrap();
        v.position = at;
        v.current_speed = 0.0;
    }

    for _ in 0..600 {
        sim.tick();
    }
    assert!(sim.vehicles.is_empty(), "vehicles stuck in the box");
    assert_eq!(sim.metrics().vehicles_passed, 2);
}
