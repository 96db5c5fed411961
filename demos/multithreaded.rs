use std::sync::Arc;
use std::thread;

use residue::{Activation, Condition, PlannerBuilder};

fn main() {
    let planner = Arc::new(
        PlannerBuilder::new()
            .variable_source("min_level", "P.attr.level - 1")
            .expect("invalid variable")
            .build(),
    );
    let condition = Arc::new(
        Condition::parse("R.attr.level <= V.min_level || R.attr.owner == P.id")
            .expect("invalid condition"),
    );

    let handles: Vec<_> = (0..4_i64)
        .map(|i| {
            let planner = Arc::clone(&planner);
            let condition = Arc::clone(&condition);
            thread::spawn(move || {
                let activation = Activation::new()
                    .set("P.id", format!("user{i}"))
                    .set("P.attr.level", 1 + i);
                let result = planner.plan(&condition, &activation);
                match result {
                    Ok(plan) => println!("Thread {i}: {plan}"),
                    Err(e) => println!("Thread {i}: {e}"),
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
