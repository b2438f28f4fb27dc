use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use colony::{
    engine::{EngineBuilder, EngineSettings},
    scenario::{Scenario, ScenarioLoader},
    structure::StructureType,
    tile::Tile,
    world::{World, WorldSummary},
};
use tempfile::tempdir;

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn outpost() -> Scenario {
    scenario_loader()
        .load("scenarios/outpost.yaml")
        .expect("outpost scenario loads")
}

fn run(scenario: &Scenario, world: &mut World, ticks: u64) -> WorldSummary {
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        dt: scenario.dt(None),
    };
    let mut engine = EngineBuilder::new(settings)
        .with_system(scenario.order_system())
        .build();
    engine.run(world, ticks).expect("run succeeds");
    world.summary()
}

#[test]
fn outpost_scenario_bootstraps() {
    let scenario = outpost();
    assert_eq!(scenario.name, "outpost");
    assert_eq!(scenario.orders.len(), 2);

    let world = scenario.build_world().unwrap();
    let summary = world.summary();
    assert_eq!(summary.structures.get("floor"), Some(&48));
    assert_eq!(summary.walkable_tiles, 48);
    assert_eq!(world.characters().len(), 2);
    assert_eq!(world.job_count(), 0);
}

#[test]
fn outpost_builds_every_order() {
    let scenario = outpost();
    let mut world = scenario.build_world().unwrap();

    let completed = Rc::new(RefCell::new(Vec::new()));
    {
        let completed = Rc::clone(&completed);
        world.subscribe_on_job_completed(move |job| completed.borrow_mut().push(job.kind()));
    }

    let summary = run(&scenario, &mut world, scenario.ticks(None));

    assert_eq!(summary.structures.get("floor"), Some(&72));
    assert_eq!(summary.structures.get("wall"), Some(&4));
    assert_eq!(summary.jobs_queued, 0);
    assert_eq!(summary.jobs_in_progress, 0);
    assert_eq!(summary.jobs_open, 0);
    assert_eq!(summary.jobs_completed, 28);
    assert_eq!(world.job_count(), 0);

    let completed = completed.borrow();
    assert_eq!(completed.len(), 28);
    assert_eq!(
        completed
            .iter()
            .filter(|kind| **kind == StructureType::Wall)
            .count(),
        4
    );

    for x in 12..16 {
        assert!(!world.graph().contains(Tile::new(x, 8)), "wall at x={x}");
        assert!(world.graph().contains(Tile::new(x, 7)));
    }
    assert!(world.characters().iter().all(|c| c.is_idle()));
}

#[test]
fn runs_are_deterministic() {
    let scenario = outpost();
    let mut first = scenario.build_world().unwrap();
    let mut second = scenario.build_world().unwrap();

    let a = serde_json::to_string(&run(&scenario, &mut first, 250)).unwrap();
    let b = serde_json::to_string(&run(&scenario, &mut second, 250)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unreachable_orders_stay_queued() {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("island.yaml"),
        r#"
name: island
seed: 5
dt: 0.1
world: { width: 12, height: 12, job_order: fifo }
characters: { count: 1 }
prebuilt:
  - { kind: floor, x: 0, y: 0, width: 2, height: 2 }
orders:
  - { kind: floor, x: 9, y: 9 }
  - { kind: floor, x: 2, y: 0 }
"#,
    )
    .unwrap();
    let scenario = ScenarioLoader::new(dir.path()).load("island.yaml").unwrap();
    let mut world = scenario.build_world().unwrap();

    let summary = run(&scenario, &mut world, 200);

    assert_eq!(summary.jobs_completed, 1);
    assert_eq!(summary.jobs_queued, 1);
    assert_eq!(world.structures_at(Tile::new(2, 0)).len(), 1);
    assert!(world.structures_at(Tile::new(9, 9)).is_empty());
    assert!(world.job_at(Tile::new(9, 9)).is_some());
    assert!(world.characters()[0].is_idle());
}

#[test]
fn neighbours_are_notified_while_building() {
    let scenario = outpost();
    let mut world = scenario.build_world().unwrap();
    let changed = Rc::new(RefCell::new(Vec::new()));
    {
        let changed = Rc::clone(&changed);
        world.subscribe_on_structure_changed(move |structure| {
            changed.borrow_mut().push(structure.tile)
        });
    }

    world
        .place_prebuilt(Tile::new(12, 5), StructureType::Floor)
        .unwrap();

    let changed = changed.borrow();
    assert_eq!(changed[0], Tile::new(12, 5));
    assert_eq!(
        changed[1..],
        [Tile::new(11, 4), Tile::new(11, 5), Tile::new(11, 6)]
    );
}

#[test]
fn loader_reports_missing_and_malformed_files() {
    let dir = tempdir().expect("tempdir");
    let loader = ScenarioLoader::new(dir.path());

    let missing = loader.load("nope.yaml").unwrap_err();
    assert!(missing.to_string().contains("Failed to read scenario file"));

    fs::write(dir.path().join("bad.yaml"), "name: [unterminated").unwrap();
    let malformed = loader.load("bad.yaml").unwrap_err();
    assert!(malformed.to_string().contains("Failed to parse"));

    fs::write(
        dir.path().join("empty.yaml"),
        "name: empty\nseed: 1\nworld: { width: 0, height: 3 }\n",
    )
    .unwrap();
    let invalid = loader.load("empty.yaml").unwrap_err();
    assert!(format!("{invalid:#}").contains("at least 1x1"));
}
