use residue::{normalise, parse, Filter, LogicalOperation, Operator, PlanFilter, PlanNode};

fn leaf(source: &str) -> Filter {
    Filter::Expression(parse(source).unwrap())
}

fn node(source: &str) -> PlanNode {
    PlanNode::Expression(parse(source).unwrap())
}

#[test]
fn differently_built_trees_render_alike() {
    let first = Filter::And(vec![
        leaf("R.attr.geo == \"GB\""),
        Filter::And(vec![leaf("R.attr.public"), leaf("R.attr.owner == \"harry\"")]),
    ]);
    let second = Filter::And(vec![
        Filter::And(vec![leaf("R.attr.owner == \"harry\""), leaf("R.attr.geo == \"GB\"")]),
        leaf("R.attr.public"),
        leaf("R.attr.geo == \"GB\""),
    ]);
    let first = normalise(first);
    assert_eq!(first, normalise(second));
    assert_eq!(
        first.to_string(),
        "(R.attr.geo == \"GB\" && R.attr.owner == \"harry\" && R.attr.public)"
    );
}

#[test]
fn de_morgan_through_plan_operations() {
    let plan = PlanNode::Operation(LogicalOperation {
        operator: Operator::Or,
        nodes: vec![node("!(R.attr.a && R.attr.b)"), node("R.attr.c")],
    });
    let PlanFilter::Conditional(filter) = PlanFilter::from_plan(&plan) else {
        panic!("expected a conditional filter");
    };
    assert_eq!(filter.to_string(), "(!(R.attr.a) || !(R.attr.b) || R.attr.c)");
}

#[test]
fn nested_negations() {
    let filter = Filter::Not(Box::new(Filter::Or(vec![
        leaf("R.attr.a"),
        Filter::Not(Box::new(Filter::And(vec![leaf("R.attr.b"), leaf("R.attr.c")]))),
    ])));
    assert_eq!(normalise(filter).to_string(), "(!(R.attr.a) && R.attr.b && R.attr.c)");
}

#[test]
fn leaves_with_lower_precedence_are_grouped() {
    let filter = Filter::And(vec![leaf("R.attr.a ? R.attr.b : R.attr.c"), leaf("R.attr.d")]);
    assert_eq!(
        normalise(filter).to_string(),
        "((R.attr.a ? R.attr.b : R.attr.c) && R.attr.d)"
    );
}

#[test]
fn decided_plans() {
    assert_eq!(PlanFilter::from_plan(&PlanNode::Constant(true)), PlanFilter::AlwaysAllowed);
    assert_eq!(PlanFilter::from_plan(&PlanNode::Constant(false)), PlanFilter::AlwaysDenied);
    assert_eq!(
        PlanFilter::from_plan(&node("R.attr.a || !R.attr.a")).to_string(),
        "(!(R.attr.a) || R.attr.a)"
    );
}

#[test]
fn normalising_twice_changes_nothing() {
    let filter = Filter::Or(vec![
        Filter::Not(Box::new(leaf("R.attr.a && (R.attr.b || R.attr.c)"))),
        leaf("R.attr.d in [1, 2]"),
        Filter::Or(vec![leaf("R.attr.e"), Filter::And(Vec::new())]),
    ]);
    let once = normalise(filter);
    assert_eq!(normalise(once.clone()), once);
}
