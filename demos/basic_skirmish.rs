//! Headless demonstration of the Duskfall tactical core.
//!
//! Drives the bundled skirmish with scripted inputs: the player side just
//! waits every activation, the AI side closes in and fights. Prints the
//! timeline preview and the battle log as the fight unfolds.
//!
//! Run with: cargo run --example basic_skirmish

use duskfall_sim::{BattleWorld, Flow, InputEvent};

fn main() {
    let plan = duskfall_sim::scenario::skirmish_plan(2024);
    let mut world = BattleWorld::new(plan).expect("bundled scenario is well-formed");

    println!("=== Duskfall - Skirmish at the Ford ===\n");

    let mut flow = world.advance().expect("battle starts cleanly");
    let mut activations = 0;
    while flow == Flow::AwaitingInput && activations < 60 {
        activations += 1;
        print_turn_banner(&mut world);

        // The scripted player stands its ground.
        flow = world
            .handle_input(InputEvent::EndTurn)
            .expect("scripted input is valid");
    }

    println!("\n=== Battle log ===");
    for line in world.state().log.lines() {
        println!("  {line}");
    }

    match world.state().objectives.outcome {
        Some(outcome) => println!("\nOutcome after {activations} player activations: {outcome:?}"),
        None => println!("\nNo outcome after {activations} player activations"),
    }
}

fn print_turn_banner(world: &mut BattleWorld) {
    let ctx = world.render_context();
    let tick = world.state().timeline.now();
    println!("--- Tick {tick} ---");
    for unit in &ctx.units {
        println!(
            "  {:10} {:?} at ({}, {})  {}/{} hp",
            unit.name, unit.team, unit.x, unit.y, unit.hp_cur, unit.hp_max
        );
    }
    let upcoming: Vec<String> = ctx
        .timeline_preview
        .iter()
        .map(|e| format!("{} (+{})", e.unit_name, e.ready_in_ticks))
        .collect();
    println!("  next: {}", upcoming.join(", "));
}
