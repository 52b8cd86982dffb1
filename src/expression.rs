//! Expression segments: the text between interpolation delimiters.
//!
//! The grammar is small. Nothing here executes application
//! code; an expression can only read scope paths, literals and filters.
//!
//! ```text
//! expr     := operand ( '|' filter )*
//! filter   := ident ( ':' operand )*
//! operand  := '!'* ( string | number | true | false | null | undefined | path )
//! path     := ident ( '.' ( ident | index ) )*
//! ```

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::filters::Filters;
use crate::scope::Scope;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path(String),
    Not(Box<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub source: String,
    pub head: Operand,
    pub filters: Vec<FilterCall>,
}

impl Operand {
    fn collect_paths(&self, out: &mut BTreeSet<String>) {
        match self {
            Operand::Literal(_) => {}
            Operand::Path(path) => {
                out.insert(path.clone());
            }
            Operand::Not(inner) => inner.collect_paths(out),
        }
    }

    fn evaluate(&self, scope: &Scope) -> Value {
        match self {
            Operand::Literal(value) => value.clone(),
            Operand::Path(path) => scope.get(path),
            Operand::Not(inner) => Value::Bool(!inner.evaluate(scope).truthy()),
        }
    }
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parts = split_outside_quotes(source, '|', source)?.into_iter();
        let head_src = parts.next().unwrap_or_default();
        let head = parse_operand(&head_src, source)?;

        let mut filters = Vec::new();
        for part in parts {
            let mut pieces = split_outside_quotes(&part, ':', source)?.into_iter();
            let name = pieces.next().unwrap_or_default().trim().to_string();
            if !is_valid_identifier(&name) {
                return Err(Error::syntax(source, format!("invalid filter name `{}`", name)));
            }
            let args = pieces
                .map(|arg| parse_operand(&arg, source))
                .collect::<Result<Vec<_>>>()?;
            filters.push(FilterCall { name, args });
        }

        Ok(Expression {
            source: source.trim().to_string(),
            head,
            filters,
        })
    }

    /// Scope paths read by the head operand and by every filter argument.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.head.collect_paths(&mut out);
        for filter in &self.filters {
            for arg in &filter.args {
                arg.collect_paths(&mut out);
            }
        }
        out
    }

    /// Evaluate and pipe through filters left to right.
    pub fn evaluate(&self, scope: &Scope, filters: &Filters) -> Result<Value> {
        let mut value = self.head.evaluate(scope);
        for call in &self.filters {
            let filter = filters.get(&call.name).ok_or_else(|| Error::UnknownFilter {
                name: call.name.clone(),
            })?;
            let args: Vec<Value> = call.args.iter().map(|arg| arg.evaluate(scope)).collect();
            value = filter(&value, &args);
        }
        Ok(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Split on `sep` outside of quoted strings.
fn split_outside_quotes(input: &str, sep: char, source: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_string: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            in_string = Some(c);
            current.push(c);
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    if in_string.is_some() {
        return Err(Error::syntax(source, "unterminated string literal"));
    }
    parts.push(current);
    Ok(parts)
}

fn parse_operand(raw: &str, source: &str) -> Result<Operand> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::syntax(source, "empty operand"));
    }

    if let Some(rest) = trimmed.strip_prefix('!') {
        return Ok(Operand::Not(Box::new(parse_operand(rest, source)?)));
    }

    if let Some(literal) = try_parse_string_literal(trimmed) {
        return Ok(Operand::Literal(Value::String(literal)));
    }

    match trimmed {
        "true" => return Ok(Operand::Literal(Value::Bool(true))),
        "false" => return Ok(Operand::Literal(Value::Bool(false))),
        "null" | "undefined" => return Ok(Operand::Literal(Value::Null)),
        _ => {}
    }

    if trimmed.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        return trimmed
            .parse::<f64>()
            .map(|n| Operand::Literal(Value::Number(n)))
            .map_err(|_| Error::syntax(source, format!("invalid number `{}`", trimmed)));
    }

    if is_valid_path(trimmed) {
        return Ok(Operand::Path(trimmed.to_string()));
    }

    Err(Error::syntax(
        source,
        format!("`{}` is not a path, literal or filter", trimmed),
    ))
}

/// Parse a single or double quoted string literal.
fn try_parse_string_literal(s: &str) -> Option<String> {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if !quoted {
        return None;
    }
    Some(unescape_string(&s[1..s.len() - 1]))
}

/// Unescape basic string escape sequences
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// `a.b.0.c`: identifier first, then identifiers or numeric indices.
fn is_valid_path(s: &str) -> bool {
    let mut segments = s.split('.');
    let first_ok = segments.next().is_some_and(is_valid_identifier);
    first_ok
        && segments.all(|seg| {
            is_valid_identifier(seg) || (!seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;
    use serde_json::json;

    #[test]
    fn test_parse_path_with_filters() {
        let expr = Expression::parse(" user.name | upper | default:'anon' ").unwrap();
        assert_eq!(expr.head, Operand::Path("user.name".into()));
        assert_eq!(expr.filters.len(), 2);
        assert_eq!(expr.filters[1].name, "default");
        assert_eq!(
            expr.filters[1].args,
            vec![Operand::Literal(Value::from("anon"))]
        );
    }

    #[test]
    fn test_dependencies_include_filter_args() {
        let expr = Expression::parse("title | default:fallback.text").unwrap();
        let deps: Vec<String> = expr.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["fallback.text".to_string(), "title".to_string()]);
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            Expression::parse("'a|b'").unwrap().head,
            Operand::Literal(Value::from("a|b"))
        );
        assert_eq!(
            Expression::parse("42").unwrap().head,
            Operand::Literal(Value::Number(42.0))
        );
        assert_eq!(
            Expression::parse("undefined").unwrap().head,
            Operand::Literal(Value::Null)
        );
    }

    #[test]
    fn test_negation() {
        let scope = Scope::from_json(&Scheduler::new(), json!({ "flag": false }));
        let expr = Expression::parse("!flag").unwrap();
        assert_eq!(
            expr.evaluate(&scope, &Filters::new()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(expr.dependencies().len(), 1);
    }

    #[test]
    fn test_malformed_expressions() {
        for bad in ["", "a +", "a || b", "'open", "a..b", "| upper", "1x"] {
            let err = Expression::parse(bad).unwrap_err();
            assert_eq!(err.code(), crate::error::ERR_SYNTAX, "input: {:?}", bad);
        }
    }

    #[test]
    fn test_unknown_filter_fails_at_evaluation() {
        let scope = Scope::new(&Scheduler::new());
        let expr = Expression::parse("a | nope").unwrap();
        assert_eq!(
            expr.evaluate(&scope, &Filters::builtin()).unwrap_err(),
            Error::UnknownFilter {
                name: "nope".into()
            }
        );
    }
}
