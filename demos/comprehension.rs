use residue::{Activation, PlannerBuilder, Value};

fn main() {
    let planner = PlannerBuilder::new().declare("T").build();
    let activation = Activation::new()
        .set("T", 100_i64)
        .set("P.attr.regions", Value::list(["GB", "US"]));

    for source in [
        "R.attr.items.filter(x, x.price > T).size() > 0",
        "R.attr.items.all(x, x.region in P.attr.regions)",
        "R.attr.labels.exists(k, v, k == \"team\" && v == P.attr.regions[0])",
        "P.attr.regions.exists_one(r, r == R.attr.region)",
        "R.attr.items.map(x, x.price > T, x.id) == []",
    ] {
        match planner.plan_source(source, &activation) {
            Ok(plan) => println!("{source}\n  => {plan}"),
            Err(e) => println!("{source}\n  => error: {e}"),
        }
    }
}
