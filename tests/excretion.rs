use rand::rngs::StdRng;
use rand::SeedableRng;
use signal_common::{Shape, Vec2};
use signal_engine::{Agent, Cell, Coordinate, DiffusionField, GridSize, StepContext, StochasticReactions};

const CONVERSION: f64 = 0.5;

fn scenario() -> (DiffusionField, StochasticReactions, Cell) {
    let mut field = DiffusionField::new(Vec2::new(10.0, 10.0), GridSize::new(10, 10));
    field.register_signal("A", 0.0, 0.0);

    let mut reactions = StochasticReactions::new();
    reactions.extend(&["env_A"], &["A"], 1.0).unwrap();

    // (-1.5, -1.5) lies in grid cell (3, 3)
    let cell = Cell::new("producer", Vec2::new(-1.5, -1.5), vec![]).with_molecule("A", 5);
    (field, reactions, cell)
}

#[test]
fn excreted_molecules_land_in_the_agent_cell() {
    let (mut field, mut reactions, mut cell) = scenario();
    let a = field.signal_id("A").unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let report = reactions.step(&mut cell, &mut StepContext::new(&mut field, CONVERSION), 1.0e6, &mut rng);

    assert_eq!(report.firings, 5);
    assert_eq!(cell.molecule_count("A"), 0);
    assert_eq!(field.get(a, Coordinate::new(3, 3)), 5.0 * CONVERSION);
    assert_eq!(field.total(a).unwrap(), 5.0 * CONVERSION);
}

#[test]
fn short_steps_move_molecules_gradually() {
    let (mut field, mut reactions, mut cell) = scenario();
    let a = field.signal_id("A").unwrap();
    let mut rng = StdRng::seed_from_u64(9);

    let mut firings = 0;
    for _ in 0..200 {
        field.update(0.01);
        let report = reactions.step(&mut cell, &mut StepContext::new(&mut field, CONVERSION), 0.01, &mut rng);
        assert!(report.elapsed <= 0.01);
        firings += report.firings;

        let moved = 5 - cell.molecule_count("A");
        assert_eq!(moved, firings);
        assert_eq!(field.get(a, Coordinate::new(3, 3)), moved as f64 * CONVERSION);
    }
    assert!(firings <= 5);
}

#[test]
fn border_footprint_spreads_excretion_over_the_outline() {
    let mut field = DiffusionField::new(Vec2::new(20.0, 20.0), GridSize::new(20, 20));
    let a = field.register_signal("A", 0.0, 0.0);
    let mut reactions = StochasticReactions::new();
    reactions.extend(&["env"], &["A"], 1.0).unwrap();
    let mut cell = Cell::new("round", Vec2::zero(), vec![Shape::circle(4.0)]).with_molecule("A", 200);
    let mut rng = StdRng::seed_from_u64(1);

    let report = reactions.step(&mut cell, &mut StepContext::new(&mut field, 1.0), 1.0e6, &mut rng);
    assert_eq!(report.firings, 200);

    let footprint = reactions.footprint().to_vec();
    assert!(footprint.len() > 1);
    // The centre is inside the membrane, so it receives nothing
    assert!(!footprint.contains(&Coordinate::new(10, 10)));
    assert_eq!(field.get(a, Coordinate::new(10, 10)), 0.0);
    let on_footprint: f64 = footprint.iter().map(|c| field.get(a, *c)).sum();
    assert_eq!(on_footprint, 200.0);
    assert_eq!(field.total(a).unwrap(), 200.0);
}
