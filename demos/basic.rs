use residue::{Activation, Condition, PlannerBuilder};

fn main() {
    // Define the planner and the variables policies may refer to
    let planner = PlannerBuilder::new()
        .variable_source("is_owner", "R.attr.owner == P.id")
        .expect("invalid variable")
        .build();

    let condition = Condition::any([
        Condition::parse("P.attr.roles.exists(r, r == \"admin\")").expect("invalid condition"),
        Condition::all([
            Condition::parse("V.is_owner").expect("invalid condition"),
            Condition::parse("R.attr.status != \"ARCHIVED\"").expect("invalid condition"),
        ]),
    ]);

    // Plan against what is known about the principal
    let activation = Activation::new()
        .set("P.id", "harry")
        .set("P.attr.roles", residue::Value::list(["user"]));

    match planner.plan(&condition, &activation) {
        Ok(plan) => println!("Plan: {plan}"),
        Err(e) => println!("Planning failed: {e}"),
    }
}
