use chrono::{TimeZone, Utc};
use residue::{
    Activation, Clock, Condition, EvaluationError, LogicalOperation, Operator, PlanError,
    PlanFilter, PlanNode, Planner, PlannerBuilder, Value,
};

fn planner() -> Planner {
    PlannerBuilder::new()
        .declare("T")
        .declare("gb_us")
        .declare("gbLoc")
        .declare("ca")
        .variable_source("locale", "R.attr.language + \"_\" + R.attr.country")
        .unwrap()
        .variable_source("geo", "R.attr.geo")
        .unwrap()
        .variable_source("gb_us2", "V.geo in gb_us")
        .unwrap()
        .variable_source("gb_us", "variables.geo == \"GB\" || V.geo == \"US\"")
        .unwrap()
        .variable_source("info", "{\"country\": V.geo, \"locale\": V.locale}")
        .unwrap()
        .clock(Clock::Fixed(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
        .build()
}

fn activation() -> Activation {
    Activation::new()
        .set("gbLoc", "en_GB")
        .set("gb_us", Value::list(["GB", "US"]))
        .set("ca", "ca")
        .set("T", 100_i64)
        .set("P.attr.name", "harry")
        .set("P.attr.authenticated", true)
        .set("P.attr.admin", false)
        .set("P.attr.geo", "GB")
}

fn leaf(source: &str) -> Condition {
    Condition::parse(source).unwrap()
}

fn plan(condition: &Condition) -> Result<PlanNode, PlanError> {
    planner().plan(condition, &activation())
}

fn rendered(source: &str) -> String {
    plan(&leaf(source)).unwrap().to_string()
}

#[test]
fn constant_leaves() {
    assert_eq!(plan(&leaf("false")).unwrap(), PlanNode::Constant(false));
    assert_eq!(plan(&leaf("P.attr.authenticated")).unwrap(), PlanNode::Constant(true));
    assert_eq!(plan(&leaf("P.attr.geo in gb_us")).unwrap(), PlanNode::Constant(true));
}

#[test]
fn unknown_attributes_are_kept() {
    assert_eq!(
        rendered("R.attr.department == \"marketing\""),
        "R.attr.department == \"marketing\""
    );
    assert_eq!(rendered("has(R.attr.geo)"), "has(R.attr.geo)");
}

#[test]
fn known_roots_are_substituted() {
    assert_eq!(rendered("R.attr.geo == gbLoc"), "R.attr.geo == \"en_GB\"");
    assert_eq!(rendered("R.attr.geo in gb_us"), "R.attr.geo in [\"GB\", \"US\"]");
    assert_eq!(rendered("gbLoc in R.attr.locales"), "\"en_GB\" in R.attr.locales");
    assert_eq!(rendered("R.attr.geo.lowerAscii() == ca"), "R.attr.geo.lowerAscii() == \"ca\"");
    assert_eq!(rendered("size(R.attr.tags) > T"), "size(R.attr.tags) > 100");
}

#[test]
fn variables_are_inlined() {
    assert_eq!(
        rendered("V.locale == gbLoc"),
        "R.attr.language + \"_\" + R.attr.country == \"en_GB\""
    );
    assert_eq!(rendered("V.gb_us2"), "R.attr.geo in [\"GB\", \"US\"]");
    assert_eq!(
        rendered("V.gb_us"),
        "R.attr.geo == \"GB\" || R.attr.geo == \"US\""
    );
    assert_eq!(
        rendered("V.info.country == P.attr.geo"),
        "{\"country\": R.attr.geo, \"locale\": R.attr.language + \"_\" + R.attr.country}.country == \"GB\""
    );
}

#[test]
fn variable_presence() {
    assert_eq!(plan(&leaf("has(V.geo)")).unwrap(), PlanNode::Constant(true));
    assert_eq!(plan(&leaf("has(variables.nowhere)")).unwrap(), PlanNode::Constant(false));
}

#[test]
fn comprehension_bodies_are_partially_evaluated() {
    assert_eq!(
        rendered("R.attr.items.filter(x, x.price > T).size() > 0"),
        "R.attr.items.filter(x, x.price > 100).size() > 0"
    );
    assert_eq!(
        rendered("R.attr.tags.exists(t, t == gbLoc)"),
        "R.attr.tags.exists(t, t == \"en_GB\")"
    );
    assert_eq!(
        rendered("R.attr.workspaces.all(w, w.geo in gb_us && P.attr.authenticated)"),
        "R.attr.workspaces.all(w, w.geo in [\"GB\", \"US\"])"
    );
    assert_eq!(
        rendered("R.attr.scores.exists(k, v, k == ca && v > T)"),
        "R.attr.scores.exists(k, v, k == \"ca\" && v > 100)"
    );
    assert_eq!(
        rendered("gb_us.exists(c, c == R.attr.geo)"),
        "[\"GB\", \"US\"].exists(c, c == R.attr.geo)"
    );
}

#[test]
fn known_comprehensions_fold() {
    assert_eq!(plan(&leaf("gb_us.exists_one(c, c == \"GB\")")).unwrap(), PlanNode::Constant(true));
    assert_eq!(
        plan(&leaf("gb_us.map(c, c.lowerAscii()) == [\"gb\", \"us\"]")).unwrap(),
        PlanNode::Constant(true)
    );
}

#[test]
fn conditional_prunes_decided_branch() {
    assert_eq!(
        rendered("P.attr.admin ? true : R.attr.owner == P.attr.name"),
        "R.attr.owner == \"harry\""
    );
}

#[test]
fn timestamps_keep_structure() {
    assert_eq!(rendered("R.attr.created < now()"), "R.attr.created < now()");
    assert_eq!(
        rendered("R.attr.expires > timestamp(\"2024-01-01T00:00:00Z\") + duration(\"1h\")"),
        "R.attr.expires > timestamp(\"2024-01-01T00:00:00Z\") + duration(\"1h\")"
    );
}

#[test]
fn and_collapses_on_false() {
    let condition = Condition::all([leaf("false"), leaf("R.attr.department == \"marketing\"")]);
    assert_eq!(plan(&condition).unwrap(), PlanNode::Constant(false));
}

#[test]
fn or_collapses_on_true() {
    let condition = Condition::any([leaf("R.attr.public"), leaf("P.attr.authenticated")]);
    assert_eq!(plan(&condition).unwrap(), PlanNode::Constant(true));
}

#[test]
fn children_keep_their_order() {
    let condition = Condition::any([
        leaf("R.attr.b == 2"),
        leaf("P.attr.admin"),
        leaf("R.attr.a == 1"),
        Condition::all([leaf("R.attr.owner == P.attr.name"), leaf("R.attr.public")]),
    ]);
    let node = plan(&condition).unwrap();
    let Some(LogicalOperation { operator, nodes }) = node.as_operation() else {
        panic!("expected an operation, got {node}");
    };
    assert_eq!(*operator, Operator::Or);
    assert_eq!(nodes.len(), 3);
    assert_eq!(
        node.to_string(),
        "(R.attr.b == 2 || R.attr.a == 1 || (R.attr.owner == \"harry\" && R.attr.public))"
    );
}

#[test]
fn single_survivor_replaces_operation() {
    let condition = Condition::all([leaf("P.attr.authenticated"), leaf("R.attr.public")]);
    assert_eq!(plan(&condition).unwrap().to_string(), "R.attr.public");
}

#[test]
fn errors_abort_the_whole_tree() {
    let condition = Condition::any([leaf("P.attr.authenticated"), leaf("V.missing")]);
    assert!(matches!(
        plan(&condition),
        Err(PlanError::UnknownVariable { name }) if name == "V.missing"
    ));

    let condition = Condition::all([leaf("R.attr.public"), leaf("T / 0 > 1")]);
    assert!(matches!(
        plan(&condition),
        Err(PlanError::Evaluation(EvaluationError::DivisionByZero))
    ));
}

#[test]
fn cyclic_variables_are_rejected() {
    let planner = PlannerBuilder::new()
        .variable_source("a", "V.b && R.attr.x")
        .unwrap()
        .variable_source("b", "!V.a")
        .unwrap()
        .build();
    let err = planner.plan(&leaf("V.a"), &Activation::new()).unwrap_err();
    assert_eq!(err.to_string(), "variable cycle detected: a -> b -> a");
}

#[test]
fn undeclared_roots_are_rejected() {
    let err = PlannerBuilder::new()
        .build()
        .plan(&leaf("gbLoc == R.attr.geo"), &activation())
        .unwrap_err();
    assert!(matches!(err, PlanError::UnknownVariable { name } if name == "gbLoc"));
}

#[test]
fn plan_filter_classifies_plans() {
    let planner = planner();
    let activation = activation();
    assert_eq!(
        planner.plan_filter(&leaf("P.attr.authenticated"), &activation).unwrap(),
        PlanFilter::AlwaysAllowed
    );
    assert_eq!(
        planner.plan_filter(&leaf("P.attr.admin"), &activation).unwrap(),
        PlanFilter::AlwaysDenied
    );
    let PlanFilter::Conditional(filter) = planner
        .plan_filter(&leaf("!(R.attr.public || R.attr.owner == P.attr.name)"), &activation)
        .unwrap()
    else {
        panic!("expected a conditional filter");
    };
    assert_eq!(filter.to_string(), "(!(R.attr.owner == \"harry\") && !(R.attr.public))");
}

#[test]
fn request_paths_read_principal_and_resource() {
    let planner = PlannerBuilder::new().build();
    let activation = Activation::new()
        .set("P.attr.authenticated", true)
        .set("P.attr.department_role", Value::map([("marketing", "ADMIN")]))
        .set("R.attr.department", "marketing");
    for source in [
        "request.principal.attr.authenticated",
        "P.attr.department_role[R.attr.department] == \"ADMIN\"",
        "request.principal.attr.department_role[request.resource.attr.department] == \"ADMIN\"",
    ] {
        assert_eq!(
            planner.plan(&leaf(source), &activation).unwrap(),
            PlanNode::Constant(true),
            "{source}"
        );
    }
    assert_eq!(
        planner
            .plan(&leaf("request.resource.attr.owner == P.attr.name"), &activation)
            .unwrap()
            .to_string(),
        "request.resource.attr.owner == P.attr.name"
    );
}
