use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// Reserved state name that stops processing of the remaining input
const END_STATE: &str = "End";

/// Reserved state name whose rules run once against an empty line at end of input
const EOF_STATE: &str = "EOF";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("line {line}: invalid value declaration: {reason}")]
    InvalidValue { line: usize, reason: String },
    #[error("line {line}: unsupported value option '{option}'")]
    UnknownOption { line: usize, option: String },
    #[error("line {line}: duplicate value '{name}'")]
    DuplicateValue { line: usize, name: String },
    #[error("line {line}: duplicate state '{name}'")]
    DuplicateState { line: usize, name: String },
    #[error("line {line}: invalid state name '{name}'")]
    InvalidState { line: usize, name: String },
    #[error("line {line}: rule references undeclared value '{name}'")]
    UndeclaredValue { line: usize, name: String },
    #[error("line {line}: transition to undeclared state '{name}'")]
    UndeclaredState { line: usize, name: String },
    #[error("line {line}: invalid action '{action}'")]
    InvalidAction { line: usize, action: String },
    #[error("line {line}: rule declared outside of a state")]
    RuleOutsideState { line: usize },
    #[error("line {line}: value declared after the first state")]
    ValueAfterState { line: usize },
    #[error("line {line}: invalid regex: {source}")]
    Regex {
        line: usize,
        #[source]
        source: regex::Error,
    },
    #[error("line {line}: unexpected input '{text}'")]
    Syntax { line: usize, text: String },
    #[error("template declares no states")]
    NoStates,
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// A `Value` declaration
#[derive(Debug, Clone)]
pub(crate) struct ValueDef {
    pub(crate) name: String,
    pub(crate) pattern: String,
    /// Keep the captured value across records
    pub(crate) filldown: bool,
    /// Drop records where this value is unset
    pub(crate) required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    State(usize),
    End,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Action {
    pub(crate) record: bool,
    pub(crate) transition: Option<Transition>,
}

#[derive(Debug)]
pub(crate) struct Rule {
    pub(crate) regex: Regex,
    /// Indexes into `Template::values` of every value captured by this rule
    pub(crate) captures: Vec<usize>,
    pub(crate) action: Action,
}

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) name: String,
    pub(crate) rules: Vec<Rule>,
}

/// A parsed extraction template.
///
/// The text format is the subset of TextFSM used by the device templates:
///
/// ```text
/// Value [Filldown|Required] NAME (regex)
///
/// Start
///   ^literal ${NAME} more -> Record NextState
/// ```
///
/// The first declared state is the initial state. `${NAME}` in a rule is
/// replaced by a named capture of the value's regex and `$$` is a literal `$`.
/// Actions are `Next` (or `Continue`), `Record`, `Next.Record`, a state
/// name, or an action keyword followed by a state name. Only the first
/// matching rule of a state ever applies to a line.
#[derive(Debug)]
pub struct Template {
    pub(crate) values: Vec<ValueDef>,
    pub(crate) states: Vec<State>,
    pub(crate) eof_state: Option<usize>,
}

/// Rule whose transition target is resolved once every state is known
struct PendingRule {
    line: usize,
    regex: Regex,
    captures: Vec<usize>,
    record: bool,
    target: Option<String>,
}

impl Template {
    /// Parse template text. Fails on malformed templates only.
    pub fn parse(text: &str) -> TemplateResult<Self> {
        let mut values: Vec<ValueDef> = Vec::new();
        let mut states: Vec<(String, Vec<PendingRule>)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if raw.starts_with("Value ") {
                if !states.is_empty() {
                    return Err(TemplateError::ValueAfterState { line });
                }
                let value = parse_value(line, raw)?;
                if values.iter().any(|v| v.name == value.name) {
                    return Err(TemplateError::DuplicateValue {
                        line,
                        name: value.name,
                    });
                }
                values.push(value);
                continue;
            }

            if !raw.starts_with(char::is_whitespace) {
                let name = trimmed.to_string();
                if !is_identifier(&name) || name == END_STATE {
                    return Err(TemplateError::InvalidState { line, name });
                }
                if states.iter().any(|(n, _)| *n == name) {
                    return Err(TemplateError::DuplicateState { line, name });
                }
                states.push((name, Vec::new()));
                continue;
            }

            if trimmed.starts_with('^') {
                let Some((_, rules)) = states.last_mut() else {
                    return Err(TemplateError::RuleOutsideState { line });
                };
                rules.push(parse_rule(line, trimmed, &values)?);
                continue;
            }

            return Err(TemplateError::Syntax {
                line,
                text: trimmed.to_string(),
            });
        }

        if states.is_empty() {
            return Err(TemplateError::NoStates);
        }

        let index: HashMap<String, usize> = states
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();

        let mut resolved = Vec::with_capacity(states.len());
        for (name, pending) in states {
            let mut rules = Vec::with_capacity(pending.len());
            for rule in pending {
                let transition = match rule.target {
                    None => None,
                    Some(target) if target == END_STATE => Some(Transition::End),
                    Some(target) => match index.get(&target) {
                        Some(&i) => Some(Transition::State(i)),
                        None => {
                            return Err(TemplateError::UndeclaredState {
                                line: rule.line,
                                name: target,
                            })
                        }
                    },
                };
                rules.push(Rule {
                    regex: rule.regex,
                    captures: rule.captures,
                    action: Action {
                        record: rule.record,
                        transition,
                    },
                });
            }
            resolved.push(State { name, rules });
        }

        let eof_state = index.get(EOF_STATE).copied();

        Ok(Self {
            values,
            states: resolved,
            eof_state,
        })
    }
}

#[cfg(test)]
impl Template {
    /// Names of the declared values, in declaration order
    pub fn value_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|v| v.name.as_str())
    }

    /// Names of the declared states, in declaration order
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `Value [options] NAME (regex)`
fn parse_value(line: usize, raw: &str) -> TemplateResult<ValueDef> {
    let rest = raw["Value".len()..].trim();
    let invalid = |reason: &str| TemplateError::InvalidValue {
        line,
        reason: reason.to_string(),
    };

    let (first, remainder) = rest
        .split_once(char::is_whitespace)
        .ok_or_else(|| invalid("expected a name and a regex"))?;
    let remainder = remainder.trim_start();

    let (options, name, pattern) = if remainder.starts_with('(') {
        (None, first, remainder)
    } else {
        let (name, pattern) = remainder
            .split_once(char::is_whitespace)
            .ok_or_else(|| invalid("expected a regex after the value name"))?;
        (Some(first), name, pattern.trim_start())
    };

    if !is_identifier(name) {
        return Err(invalid(&format!("'{}' is not a valid value name", name)));
    }
    if !pattern.starts_with('(') || !pattern.ends_with(')') {
        return Err(invalid("regex must be enclosed in parentheses"));
    }
    Regex::new(pattern).map_err(|source| TemplateError::Regex { line, source })?;

    let mut value = ValueDef {
        name: name.to_string(),
        pattern: pattern.to_string(),
        filldown: false,
        required: false,
    };

    for option in options.into_iter().flat_map(|o| o.split(',')) {
        match option {
            "Filldown" => value.filldown = true,
            "Required" => value.required = true,
            other => {
                return Err(TemplateError::UnknownOption {
                    line,
                    option: other.to_string(),
                })
            }
        }
    }

    Ok(value)
}

/// Parse `^pattern [-> action]`
fn parse_rule(line: usize, text: &str, values: &[ValueDef]) -> TemplateResult<PendingRule> {
    let (pattern, action) = split_action(text);
    let (expanded, captures) = expand_pattern(line, pattern, values)?;
    let regex = Regex::new(&expanded).map_err(|source| TemplateError::Regex { line, source })?;
    let (record, target) = match action {
        Some(action) => parse_action(line, action)?,
        None => (false, None),
    };

    Ok(PendingRule {
        line,
        regex,
        captures,
        record,
        target,
    })
}

/// Split a rule at its last whitespace-prefixed `->`
fn split_action(text: &str) -> (&str, Option<&str>) {
    let mut search_end = text.len();
    while let Some(pos) = text[..search_end].rfind("->") {
        if pos > 0 && text[..pos].ends_with(char::is_whitespace) {
            return (text[..pos].trim_end(), Some(text[pos + 2..].trim()));
        }
        search_end = pos;
    }
    (text, None)
}

fn parse_action(line: usize, action: &str) -> TemplateResult<(bool, Option<String>)> {
    let invalid = || TemplateError::InvalidAction {
        line,
        action: action.to_string(),
    };
    let mut tokens = action.split_whitespace();
    let first = tokens.next().ok_or_else(invalid)?;
    let second = tokens.next();
    if tokens.next().is_some() {
        return Err(invalid());
    }

    match parse_keywords(first) {
        Some(record) => Ok((record, second.map(str::to_string))),
        None if second.is_none() && is_identifier(first) => Ok((false, Some(first.to_string()))),
        None => Err(invalid()),
    }
}

/// Returns `Some(record)` when `token` is an action keyword
fn parse_keywords(token: &str) -> Option<bool> {
    let (line_op, record_op) = match token.split_once('.') {
        Some((line_op, record_op)) => (Some(line_op), Some(record_op)),
        None if token == "Record" || token == "NoRecord" => (None, Some(token)),
        None => (Some(token), None),
    };

    if let Some(op) = line_op {
        if op != "Next" && op != "Continue" {
            return None;
        }
    }

    match record_op {
        None | Some("NoRecord") => Some(false),
        Some("Record") => Some(true),
        Some(_) => None,
    }
}

/// Replace `${NAME}` with named captures and `$$` with `$`
fn expand_pattern(
    line: usize,
    pattern: &str,
    values: &[ValueDef],
) -> TemplateResult<(String, Vec<usize>)> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut captures = Vec::new();
    let mut rest = pattern;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("$$") {
            out.push('$');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let end = after.find('}').ok_or_else(|| TemplateError::Syntax {
                line,
                text: pattern.to_string(),
            })?;
            let name = &after[..end];
            let idx = values
                .iter()
                .position(|v| v.name == name)
                .ok_or_else(|| TemplateError::UndeclaredValue {
                    line,
                    name: name.to_string(),
                })?;
            out.push_str(&format!("(?P<{}>{})", name, values[idx].pattern));
            captures.push(idx);
            rest = &after[end + 1..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);

    Ok((out, captures))
}
