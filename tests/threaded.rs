use std::sync::Arc;
use std::thread;

use residue::{Activation, Condition, PlanNode, PlannerBuilder, Value};

#[test]
fn plan_across_threads() {
    let planner = Arc::new(
        PlannerBuilder::new()
            .variable_source("owner", "R.attr.owner == P.id")
            .unwrap()
            .variable_source("regional", "R.attr.geo in P.attr.geos")
            .unwrap()
            .build(),
    );
    let condition = Arc::new(Condition::any([
        Condition::parse("P.attr.admin").unwrap(),
        Condition::all([
            Condition::parse("V.owner").unwrap(),
            Condition::parse("V.regional").unwrap(),
        ]),
    ]));

    let mut handles = vec![];

    // Thread 1: admin -> always allowed
    let (p, c) = (Arc::clone(&planner), Arc::clone(&condition));
    handles.push(thread::spawn(move || {
        let activation = Activation::new()
            .set("P.id", "alice")
            .set("P.attr.admin", true)
            .set("P.attr.geos", Value::list(["GB"]));
        p.plan(&c, &activation).unwrap()
    }));

    // Thread 2: regular user -> owner and region filter
    let (p, c) = (Arc::clone(&planner), Arc::clone(&condition));
    handles.push(thread::spawn(move || {
        let activation = Activation::new()
            .set("P.id", "bob")
            .set("P.attr.admin", false)
            .set("P.attr.geos", Value::list(["GB", "US"]));
        p.plan(&c, &activation).unwrap()
    }));

    // Thread 3: no regions -> denied
    let (p, c) = (Arc::clone(&planner), Arc::clone(&condition));
    handles.push(thread::spawn(move || {
        let activation = Activation::new()
            .set("P.id", "carol")
            .set("P.attr.admin", false)
            .set("P.attr.geos", Value::list(Vec::<Value>::new()));
        p.plan(&c, &activation).unwrap()
    }));

    // Thread 4: unknown admin flag -> kept in the plan
    let (p, c) = (Arc::clone(&planner), Arc::clone(&condition));
    handles.push(thread::spawn(move || {
        let activation = Activation::new().set("P.id", "dave");
        p.plan(&c, &activation).unwrap()
    }));

    let results: Vec<PlanNode> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0], PlanNode::Constant(true));
    assert_eq!(
        results[1].to_string(),
        "(R.attr.owner == \"bob\" && R.attr.geo in [\"GB\", \"US\"])"
    );
    assert_eq!(
        results[2].to_string(),
        "(R.attr.owner == \"carol\" && R.attr.geo in [])"
    );
    assert_eq!(
        results[3].to_string(),
        "(P.attr.admin || (R.attr.owner == \"dave\" && R.attr.geo in P.attr.geos))"
    );
}

#[test]
fn shared_planner_is_deterministic() {
    let planner = Arc::new(PlannerBuilder::new().build());
    let condition = Arc::new(
        Condition::parse("R.attr.items.filter(i, i.owner == P.id).size() > P.attr.min").unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let (p, c) = (Arc::clone(&planner), Arc::clone(&condition));
            thread::spawn(move || {
                let activation = Activation::new()
                    .set("P.id", format!("user{}", n % 2))
                    .set("P.attr.min", 1_i64);
                (0..50)
                    .map(|_| p.plan(&c, &activation).unwrap().to_string())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (n, handle) in handles.into_iter().enumerate() {
        let plans = handle.join().unwrap();
        let expected = format!(
            "R.attr.items.filter(i, i.owner == \"user{}\").size() > 1",
            n % 2
        );
        assert!(plans.iter().all(|plan| *plan == expected), "thread {n}");
    }
}
