use std::collections::BTreeMap;

use winnow::ascii::till_line_ending;
use winnow::combinator::{alt, cut_err, delimited, fail, not, opt, preceded, repeat, separated};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::Stateful;
use winnow::token::{any, one_of, take_while};

use crate::types::comprehension::{expand, MacroKind};
use crate::types::ops;
use crate::{call, member_call, select, Expr, ExprKind, Literal, MapEntry, MapKey, DEFAULT_MAX_DEPTH};

/// Parser input; the state counts how many expressions are currently open.
pub(super) type Input<'i> = Stateful<&'i str, usize>;

/// Bound on expressions opened inside one another (parentheses, list
/// elements, call arguments, indices and conditional branches).
const MAX_NESTING: usize = 32;

/// Bound on the depth of the tree the parser builds.
const MAX_DEPTH: usize = DEFAULT_MAX_DEPTH;

fn too_deep<O>(input: &mut Input<'_>) -> ModalResult<O> {
    cut_err(fail)
        .context(StrContext::Label("expression"))
        .context(StrContext::Expected(StrContextValue::Description(
            "less deeply nested expression",
        )))
        .parse_next(input)
}

// -- Whitespace & comments --------------------------------------------------

pub(super) fn ws(input: &mut Input<'_>) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ("//", till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Identifiers ------------------------------------------------------------

fn ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn identifier<'i>(input: &mut Input<'i>) -> ModalResult<&'i str> {
    (
        take_while(1.., |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., ident_char),
    )
        .take()
        .parse_next(input)
}

// -- Literals ---------------------------------------------------------------

/// Body of a quoted string. In byte mode `\xHH` escapes denote raw bytes;
/// otherwise they denote the code point U+00HH.
fn quoted(input: &mut Input<'_>, raw_bytes: bool) -> ModalResult<Vec<u8>> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut out = Vec::new();
    let mut buf = [0_u8; 4];
    loop {
        let ch = cut_err(any).parse_next(input)?;
        if ch == quote {
            return Ok(out);
        }
        if ch != '\\' {
            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match cut_err(any).parse_next(input)? {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            '\\' => out.push(b'\\'),
            '"' => out.push(b'"'),
            '\'' => out.push(b'\''),
            'x' => {
                let hex = cut_err(take_while(2, |c: char| c.is_ascii_hexdigit())).parse_next(input)?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| ErrMode::from_input(input).cut())?;
                if raw_bytes {
                    out.push(byte);
                } else {
                    out.extend_from_slice(char::from(byte).encode_utf8(&mut buf).as_bytes());
                }
            }
            other => {
                out.push(b'\\');
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn string_literal(input: &mut Input<'_>) -> ModalResult<String> {
    let raw = quoted(input, false)?;
    String::from_utf8(raw).map_err(|_| ErrMode::from_input(input).cut())
}

fn bytes_literal(input: &mut Input<'_>) -> ModalResult<Expr> {
    'b'.parse_next(input)?;
    let bytes = quoted(input, true)?;
    Ok(Expr::literal(Literal::Bytes(bytes)))
}

fn number(input: &mut Input<'_>) -> ModalResult<Expr> {
    let text = (
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(1.., |c: char| c.is_ascii_digit()))),
        opt((
            one_of(['e', 'E']),
            opt(one_of(['+', '-'])),
            take_while(1.., |c: char| c.is_ascii_digit()),
        )),
    )
        .take()
        .parse_next(input)?;
    if text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        let v: f64 = text.parse().map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Expr::literal(v))
    } else {
        let v: i64 = text.parse().map_err(|_| ErrMode::from_input(input).cut())?;
        Ok(Expr::literal(v))
    }
}

/// Collapse a list whose elements are all literals into a single literal.
fn fold_list(items: Vec<Expr>) -> Expr {
    if !items.iter().all(|item| item.as_literal().is_some()) {
        return Expr::new(ExprKind::List(items));
    }
    let literals = items
        .into_iter()
        .filter_map(|item| match item.kind {
            ExprKind::Literal(literal) => Some(literal),
            _ => None,
        })
        .collect();
    Expr::literal(Literal::List(literals))
}

fn literal_entries(entries: &[MapEntry]) -> Option<BTreeMap<MapKey, Literal>> {
    let mut folded = BTreeMap::new();
    for entry in entries {
        let key = MapKey::try_from(entry.key.as_literal()?).ok()?;
        let value = entry.value.as_literal()?.clone();
        if folded.insert(key, value).is_some() {
            return None;
        }
    }
    Some(folded)
}

/// Collapse a map with literal keys and values into a single literal.
fn fold_map(entries: Vec<MapEntry>) -> Expr {
    match literal_entries(&entries) {
        Some(folded) => Expr::literal(Literal::Map(folded)),
        None => Expr::new(ExprKind::Map(entries)),
    }
}

fn list_literal(input: &mut Input<'_>) -> ModalResult<Expr> {
    '['.parse_next(input)?;
    let items: Vec<Expr> = separated(0.., expr, (ws, ',')).parse_next(input)?;
    opt((ws, ',')).parse_next(input)?;
    (ws, cut_err(']')).parse_next(input)?;
    Ok(fold_list(items))
}

fn map_entry(input: &mut Input<'_>) -> ModalResult<MapEntry> {
    let key = expr(input)?;
    (ws, cut_err(':')).parse_next(input)?;
    let value = cut_err(expr).parse_next(input)?;
    Ok(MapEntry { key, value })
}

fn map_literal(input: &mut Input<'_>) -> ModalResult<Expr> {
    '{'.parse_next(input)?;
    let entries: Vec<MapEntry> = separated(0.., map_entry, (ws, ',')).parse_next(input)?;
    opt((ws, ',')).parse_next(input)?;
    (ws, cut_err('}')).parse_next(input)?;
    Ok(fold_map(entries))
}

// -- Calls & macros ---------------------------------------------------------

fn call_args(input: &mut Input<'_>) -> ModalResult<Vec<Expr>> {
    let args: Vec<Expr> = separated(0.., expr, (ws, ',')).parse_next(input)?;
    (ws, cut_err(')')).parse_next(input)?;
    Ok(args)
}

fn expand_macro(kind: MacroKind, range: Expr, args: Vec<Expr>) -> Option<Expr> {
    match kind {
        MacroKind::Map => {
            let [x, t] = <[Expr; 2]>::try_from(args).ok()?;
            expand(kind, range, x.as_ident()?, None, None, Some(t))
        }
        MacroKind::MapFilter => {
            let [x, p, t] = <[Expr; 3]>::try_from(args).ok()?;
            expand(kind, range, x.as_ident()?, None, Some(p), Some(t))
        }
        MacroKind::Filter => {
            let [x, p] = <[Expr; 2]>::try_from(args).ok()?;
            expand(kind, range, x.as_ident()?, None, Some(p), None)
        }
        MacroKind::All | MacroKind::Exists | MacroKind::ExistsOne => match args.len() {
            2 => {
                let [x, p] = <[Expr; 2]>::try_from(args).ok()?;
                expand(kind, range, x.as_ident()?, None, Some(p), None)
            }
            _ => {
                let [k, v, p] = <[Expr; 3]>::try_from(args).ok()?;
                expand(kind, range, k.as_ident()?, Some(v.as_ident()?), Some(p), None)
            }
        },
    }
}

fn method(input: &mut Input<'_>, target: Expr, name: &str, args: Vec<Expr>) -> ModalResult<Expr> {
    match MacroKind::from_call(name, args.len()) {
        Some(kind) => expand_macro(kind, target, args).ok_or_else(|| ErrMode::from_input(input).cut()),
        None => Ok(member_call(target, name, args)),
    }
}

fn presence_test(args: Vec<Expr>) -> Option<Expr> {
    let [arg] = <[Expr; 1]>::try_from(args).ok()?;
    match arg.kind {
        ExprKind::Select { operand, field, .. } => Some(Expr::new(ExprKind::Select {
            operand,
            field,
            test_only: true,
        })),
        _ => None,
    }
}

fn ident_or_call(input: &mut Input<'_>) -> ModalResult<Expr> {
    let name = identifier(input)?;
    match name {
        "true" => return Ok(Expr::literal(true)),
        "false" => return Ok(Expr::literal(false)),
        "null" => return Ok(Expr::literal(Literal::Null)),
        _ => {}
    }
    if opt(preceded(ws, '(')).parse_next(input)?.is_none() {
        return Ok(Expr::new(ExprKind::Ident(name.to_owned())));
    }
    let args = call_args(input)?;
    if name == "has" {
        return presence_test(args).ok_or_else(|| ErrMode::from_input(input).cut());
    }
    Ok(call(name, args))
}

// -- Expressions ------------------------------------------------------------
// precedence: ?: < || < && < relations < + - < * / % < unary < member

fn primary(input: &mut Input<'_>) -> ModalResult<Expr> {
    ws.parse_next(input)?;
    alt((
        delimited('(', cut_err(expr), (ws, cut_err(')'))),
        list_literal,
        map_literal,
        bytes_literal,
        string_literal.map(|s| Expr::literal(Literal::String(s))),
        number,
        ident_or_call,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "expression",
    )))
    .parse_next(input)
}

fn member(input: &mut Input<'_>) -> ModalResult<Expr> {
    let mut operand = primary(input)?;
    let mut depth = operand.depth();
    loop {
        if depth > MAX_DEPTH {
            return too_deep(input);
        }
        let checkpoint = input.checkpoint();
        ws.parse_next(input)?;
        if opt('.').parse_next(input)?.is_some() {
            let name = cut_err(preceded(ws, identifier))
                .context(StrContext::Expected(StrContextValue::Description(
                    "field name",
                )))
                .parse_next(input)?;
            if opt(preceded(ws, '(')).parse_next(input)?.is_some() {
                let args = call_args(input)?;
                operand = method(input, operand, name, args)?;
                depth = operand.depth();
            } else {
                operand = select(operand, name);
                depth += 1;
            }
        } else if opt('[').parse_next(input)?.is_some() {
            let index = cut_err(expr).parse_next(input)?;
            (ws, cut_err(']')).parse_next(input)?;
            depth = 1 + depth.max(index.depth());
            operand = call(ops::INDEX, vec![operand, index]);
        } else {
            input.reset(&checkpoint);
            return Ok(operand);
        }
    }
}

fn negate(inner: Expr) -> Expr {
    match &inner.kind {
        ExprKind::Literal(Literal::Int(i)) => {
            if let Some(negated) = i.checked_neg() {
                return Expr::literal(negated);
            }
        }
        ExprKind::Literal(Literal::Float(f)) => return Expr::literal(-f),
        _ => {}
    }
    call(ops::NEGATE, vec![inner])
}

fn unary(input: &mut Input<'_>) -> ModalResult<Expr> {
    let prefixes: Vec<char> = repeat(0.., preceded(ws, one_of(['!', '-']))).parse_next(input)?;
    if prefixes.is_empty() {
        return member(input);
    }
    let mut operand = cut_err(member).parse_next(input)?;
    let mut depth = operand.depth();
    for prefix in prefixes.into_iter().rev() {
        depth += 1;
        if depth > MAX_DEPTH {
            return too_deep(input);
        }
        operand = if prefix == '!' { !operand } else { negate(operand) };
    }
    Ok(operand)
}

type Operand = for<'i> fn(&mut Input<'i>) -> ModalResult<Expr>;
type BinaryOp = for<'i> fn(&mut Input<'i>) -> ModalResult<&'static str>;

/// One left-associative precedence level.
fn binary_level(input: &mut Input<'_>, operand: Operand, operator: BinaryOp) -> ModalResult<Expr> {
    let first = operand(input)?;
    let rest: Vec<(&'static str, Expr)> =
        repeat(0.., (preceded(ws, operator), cut_err(operand))).parse_next(input)?;
    if rest.is_empty() {
        return Ok(first);
    }
    let mut depth = first.depth();
    let mut folded = first;
    for (function, rhs) in rest {
        depth = 1 + depth.max(rhs.depth());
        if depth > MAX_DEPTH {
            return too_deep(input);
        }
        folded = call(function, vec![folded, rhs]);
    }
    Ok(folded)
}

fn multiplicative_op(input: &mut Input<'_>) -> ModalResult<&'static str> {
    alt((
        '*'.value(ops::MULTIPLY),
        ('/', not('/')).value(ops::DIVIDE),
        '%'.value(ops::MODULO),
    ))
    .parse_next(input)
}

fn additive_op(input: &mut Input<'_>) -> ModalResult<&'static str> {
    alt(('+'.value(ops::ADD), '-'.value(ops::SUBTRACT))).parse_next(input)
}

fn relation_op(input: &mut Input<'_>) -> ModalResult<&'static str> {
    alt((
        "<=".value(ops::LESS_EQUALS),
        "<".value(ops::LESS),
        ">=".value(ops::GREATER_EQUALS),
        ">".value(ops::GREATER),
        "==".value(ops::EQUALS),
        "!=".value(ops::NOT_EQUALS),
        ("in", not(one_of(ident_char))).value(ops::IN),
    ))
    .parse_next(input)
}

fn and_op(input: &mut Input<'_>) -> ModalResult<&'static str> {
    "&&".value(ops::LOGICAL_AND).parse_next(input)
}

fn or_op(input: &mut Input<'_>) -> ModalResult<&'static str> {
    "||".value(ops::LOGICAL_OR).parse_next(input)
}

fn multiplicative(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, unary, multiplicative_op)
}

fn additive(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, multiplicative, additive_op)
}

fn relation(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, additive, relation_op)
}

fn and_expr(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, relation, and_op)
}

fn or_expr(input: &mut Input<'_>) -> ModalResult<Expr> {
    binary_level(input, and_expr, or_op)
}

pub(super) fn expr(input: &mut Input<'_>) -> ModalResult<Expr> {
    if input.state >= MAX_NESTING {
        return too_deep(input);
    }
    input.state += 1;
    let parsed = conditional(input);
    input.state -= 1;
    parsed
}

fn conditional(input: &mut Input<'_>) -> ModalResult<Expr> {
    let condition = or_expr(input)?;
    if opt(preceded(ws, '?')).parse_next(input)?.is_none() {
        return Ok(condition);
    }
    let then = cut_err(or_expr).parse_next(input)?;
    (ws, cut_err(':')).parse_next(input)?;
    let otherwise = cut_err(expr).parse_next(input)?;
    let node = call(ops::CONDITIONAL, vec![condition, then, otherwise]);
    if node.depth() > MAX_DEPTH {
        return too_deep(input);
    }
    Ok(node)
}

// -- Top-level parser -------------------------------------------------------

pub(super) fn source(input: &mut Input<'_>) -> ModalResult<Expr> {
    let parsed = expr(input)?;
    ws.parse_next(input)?;
    Ok(parsed)
}
