use colony::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
};

#[test]
fn engine_runs_hook_each_tick() {
    let loader = ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"));
    let scenario = loader
        .load("scenarios/outpost.yaml")
        .expect("scenario should load");
    let mut world = scenario.build_world().expect("world builds");
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        dt: scenario.dt(None),
    };
    let mut engine = EngineBuilder::new(settings)
        .with_system(scenario.order_system())
        .build();

    let mut ticks = Vec::new();
    let mut open = Vec::new();
    engine
        .run_with_hook(&mut world, 6, |report| {
            ticks.push(report.tick);
            open.push(report.jobs_open);
        })
        .expect("run succeeds");

    assert_eq!(ticks.len(), 6);
    assert_eq!(ticks.first().copied(), Some(1));
    assert_eq!(ticks.last().copied(), Some(6));
    // The floor orders are issued before the first tick advances.
    assert_eq!(open.first().copied(), Some(24));
}
