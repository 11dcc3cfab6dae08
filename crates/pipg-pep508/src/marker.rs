//! Environment-marker evaluation.
//!
//! The grammar is a boolean combination of atomic comparisons, with `and` and
//! `or` at equal precedence evaluated left to right and parentheses for
//! grouping. An atomic term compares two values, each either a known
//! environment variable or a quoted literal. Comparisons involving a version
//! variable use PEP 440 semantics; everything else compares as strings.
//!
//! A term the evaluator cannot make sense of evaluates to `true`: excluding a
//! dependency because its marker is malformed would silently break installs,
//! so unknown shapes are accepted and logged instead.

use std::str::FromStr;

use tracing::warn;

use pipg_pep440::Version;

/// The concrete values the marker variables resolve to, as probed from the
/// target interpreter.
#[derive(Debug, Clone, Default)]
pub struct MarkerEnvironment {
    /// `python_version`, e.g. `3.12`.
    pub python_version: String,
    /// `python_full_version`, e.g. `3.12.1`.
    pub python_full_version: String,
    /// `sys_platform`, e.g. `linux` or `darwin`.
    pub sys_platform: String,
    /// `os_name`, e.g. `posix`.
    pub os_name: String,
    /// `platform_machine`, e.g. `x86_64` or `arm64`.
    pub platform_machine: String,
    /// `implementation_name`, e.g. `cpython`.
    pub implementation_name: String,
}

impl MarkerEnvironment {
    /// Resolve a marker token: a known variable resolves from the
    /// environment, a quoted literal to its contents, anything else to
    /// itself.
    fn resolve<'a>(&'a self, token: &'a str) -> &'a str {
        match unquote(token) {
            "python_version" => &self.python_version,
            "python_full_version" => &self.python_full_version,
            "sys_platform" => &self.sys_platform,
            "os_name" => &self.os_name,
            "platform_machine" => &self.platform_machine,
            "implementation_name" => &self.implementation_name,
            literal => literal,
        }
    }
}

/// Evaluate a marker expression against the given environment. An empty
/// marker is trivially true.
pub fn evaluate_marker(marker: &str, env: &MarkerEnvironment) -> bool {
    let marker = marker.trim();
    if marker.is_empty() {
        return true;
    }

    // `and` and `or` bind equally and evaluate left to right: each connective
    // folds the value so far with the next term, so `a or b and c` means
    // `(a or b) and c`.
    let mut rest = marker;
    let mut value: Option<bool> = None;
    let mut pending = Connective::And;
    loop {
        let (term, next) = match next_connective(rest) {
            Some((index, connective)) => {
                let term = &rest[..index];
                rest = &rest[index + connective.token().len()..];
                (term, Some(connective))
            }
            None => (rest, None),
        };

        let term_value = evaluate_group(term.trim(), env);
        value = Some(match value {
            None => term_value,
            Some(accumulated) => match pending {
                Connective::And => accumulated && term_value,
                Connective::Or => accumulated || term_value,
            },
        });

        match next {
            Some(connective) => pending = connective,
            None => return value.unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Connective {
    And,
    Or,
}

impl Connective {
    fn token(self) -> &'static str {
        match self {
            Self::And => " and ",
            Self::Or => " or ",
        }
    }
}

/// Evaluate a single operand, recursing into parenthesized groups.
fn evaluate_group(term: &str, env: &MarkerEnvironment) -> bool {
    if let Some(inner) = strip_outer_parens(term) {
        return evaluate_marker(inner, env);
    }
    evaluate_term(term, env)
}

/// Evaluate an atomic term such as `python_version >= "3.8"`.
fn evaluate_term(term: &str, env: &MarkerEnvironment) -> bool {
    let Some((left, operator, right)) = split_term(term) else {
        warn!("Unsupported marker term `{term}`, assuming it holds");
        return true;
    };

    // Terms over `extra` can only hold when an extra is activated, which this
    // installer never does.
    if unquote(left) == "extra" || unquote(right) == "extra" {
        return false;
    }

    let left_value = env.resolve(left);
    let right_value = env.resolve(right);

    if is_version_variable(unquote(left)) || is_version_variable(unquote(right)) {
        if let (Ok(left_version), Ok(right_version)) =
            (Version::from_str(left_value), Version::from_str(right_value))
        {
            return compare_versions(&left_version, operator, &right_version);
        }
    }

    compare_strings(left_value, operator, right_value)
}

fn is_version_variable(name: &str) -> bool {
    matches!(name, "python_version" | "python_full_version")
}

fn compare_versions(left: &Version, operator: &str, right: &Version) -> bool {
    match operator {
        "==" => left == right,
        "!=" => left != right,
        "<=" => left <= right,
        ">=" => left >= right,
        "<" => left < right,
        ">" => left > right,
        // `~=` on markers is rare enough that treating it as `>=` matches
        // what pip's lenient path does for these comparisons.
        "~=" => left >= right,
        _ => false,
    }
}

fn compare_strings(left: &str, operator: &str, right: &str) -> bool {
    match operator {
        "==" => left == right,
        "!=" => left != right,
        "<=" => left <= right,
        ">=" => left >= right,
        "<" => left < right,
        ">" => left > right,
        "in" => right.contains(left),
        "not in" => !right.contains(left),
        _ => false,
    }
}

/// Split an atomic term into (left, operator, right). Returns `None` for
/// shapes outside the grammar.
fn split_term(term: &str) -> Option<(&str, &str, &str)> {
    // `not in` before `in`, two-char operators before their one-char prefixes.
    for operator in ["not in", "in", "<=", ">=", "==", "!=", "~=", "<", ">"] {
        let mut search_start = 0;
        while let Some(position) = term[search_start..].find(operator) {
            let index = search_start + position;
            // Word operators need surrounding whitespace so `in` doesn't match
            // inside `win32`.
            let word = operator
                .chars()
                .all(|char| char.is_alphabetic() || char == ' ');
            let left = term[..index].trim_end();
            let right = term[index + operator.len()..].trim_start();
            let boundary = !word
                || (term[..index].ends_with(char::is_whitespace)
                    && term[index + operator.len()..].starts_with(char::is_whitespace));
            if boundary && !left.is_empty() && !right.is_empty() && !inside_quotes(term, index) {
                return Some((left, operator, right));
            }
            search_start = index + operator.len();
        }
    }
    None
}

fn inside_quotes(s: &str, index: usize) -> bool {
    let mut quote = None;
    for (i, char) in s.char_indices() {
        if i >= index {
            break;
        }
        match quote {
            Some(open) if char == open => quote = None,
            None if char == '"' || char == '\'' => quote = Some(char),
            _ => {}
        }
    }
    quote.is_some()
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[s.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[s.len() - 1] == b'\'')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// If the whole term is wrapped in one balanced pair of parentheses, return
/// the inside.
fn strip_outer_parens(term: &str) -> Option<&str> {
    let inner = term.strip_prefix('(')?.strip_suffix(')')?;
    // Reject `(a) and (b)`, which starts and ends with parens without being a
    // single group.
    let mut depth = 0i32;
    for char in inner.chars() {
        match char {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

/// The earliest `and`/`or` connective that sits outside parentheses and
/// quotes: its byte index and kind.
fn next_connective(s: &str) -> Option<(usize, Connective)> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, char) in s.char_indices() {
        match quote {
            Some(open) => {
                if char == open {
                    quote = None;
                }
            }
            None => match char {
                '"' | '\'' => quote = Some(char),
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {
                    if depth == 0 {
                        if s[i..].starts_with(Connective::And.token()) {
                            return Some((i, Connective::And));
                        }
                        if s[i..].starts_with(Connective::Or.token()) {
                            return Some((i, Connective::Or));
                        }
                    }
                }
            },
        }
    }
    None
}
