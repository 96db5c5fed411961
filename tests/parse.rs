use residue::{parse, Condition, ExprId, ExprKind, Literal};

#[test]
fn parse_policy_condition() {
    let expr = parse(
        r#"R.attr.status == "PENDING_APPROVAL" && P.attr.department_role[R.attr.department] == "ADMIN""#,
    )
    .unwrap();
    assert_eq!(
        expr.to_string(),
        r#"R.attr.status == "PENDING_APPROVAL" && P.attr.department_role[R.attr.department] == "ADMIN""#
    );
}

#[test]
fn whitespace_and_line_comments_are_ignored() {
    let tight = parse("R.attr.geo in[\"GB\",\"US\"]&&!R.attr.archived").unwrap();
    let loose = parse(
        "R.attr.geo   in [ \"GB\" , \"US\" ] // allowed regions\n\t&&   ! R.attr.archived",
    )
    .unwrap();
    assert_eq!(tight, loose);
}

#[test]
fn ids_are_preorder_from_one() {
    let expr = parse("a + b").unwrap();
    assert_eq!(expr.id, ExprId(1));
    let ids: Vec<u64> = expr.children().iter().map(|c| c.id.0).collect();
    assert_eq!(ids, vec![2, 3]);
    assert!(expr.duplicate_ids().is_empty());
}

#[test]
fn macros_parse_to_comprehensions() {
    let expr = parse("R.attr.items.exists(item, item.owner == P.id)").unwrap();
    let ExprKind::Comprehension(c) = &expr.kind else {
        panic!("expected comprehension, got {expr}");
    };
    assert_eq!(c.iter_var, "item");
    assert_eq!(c.iter_range.to_string(), "R.attr.items");
    assert_eq!(c.accu_init.as_literal(), Some(&Literal::Bool(false)));
}

#[test]
fn every_macro_round_trips() {
    for source in [
        "R.attr.items.all(i, i.public)",
        "R.attr.items.exists(i, i.public)",
        "R.attr.items.exists_one(i, i.public)",
        "R.attr.items.map(i, i.id)",
        "R.attr.items.map(i, i.public, i.id)",
        "R.attr.items.filter(i, i.public)",
        "R.attr.labels.exists(k, v, k == \"team\" && v == P.attr.team)",
        "R.attr.groups.all(g, g.members.exists(m, m == P.id))",
    ] {
        let expr = parse(source).unwrap();
        assert_eq!(expr.to_string(), source);
        assert_eq!(parse(&expr.to_string()).unwrap(), expr, "{source}");
    }
}

#[test]
fn parse_errors_report_offset() {
    let err = parse("R.attr.geo == ").unwrap_err();
    assert!(err.offset() <= "R.attr.geo == ".len());
    assert!(err.to_string().starts_with("invalid expression at byte"));

    for bad in ["", "R.attr.", "(a", "a ? b", "[1, 2", "f(,)", "a.all(1, true)", "has(a)"] {
        assert!(parse(bad).is_err(), "{bad:?} should not parse");
    }
}

#[test]
fn condition_parse() {
    let condition = Condition::parse("P.attr.authenticated").unwrap();
    assert!(matches!(condition, Condition::Expr(ref e) if e.to_string() == "P.attr.authenticated"));
    assert!(Condition::parse("P.attr.").is_err());
}
