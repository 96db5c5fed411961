use residue::{Activation, Condition, PlanFilter, PlannerBuilder};

fn main() {
    let planner = PlannerBuilder::new().build();
    let condition = Condition::all([
        Condition::parse("!(R.attr.archived || R.attr.deleted)").expect("invalid condition"),
        Condition::any([
            Condition::parse("R.attr.owner == P.id").expect("invalid condition"),
            Condition::parse("P.attr.admin").expect("invalid condition"),
            Condition::parse("R.attr.public && R.attr.owner == P.id").expect("invalid condition"),
        ]),
    ]);

    for admin in [false, true] {
        let activation = Activation::new().set("P.id", "harry").set("P.attr.admin", admin);
        match planner.plan_filter(&condition, &activation) {
            Ok(PlanFilter::Conditional(filter)) => println!("admin={admin}: WHERE {filter}"),
            Ok(decided) => println!("admin={admin}: {decided}"),
            Err(e) => println!("admin={admin}: planning failed: {e}"),
        }
    }
}
