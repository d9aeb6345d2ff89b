//! Directive attribute parsing.
//!
//! A directive attribute has the shape `<prefix><name>[:<argument>][.<modifier>]*`,
//! for example `data-on:keydown.enter.prevent` or `data-model.number`.

use std::time::Duration;

use crate::config::BinderConfig;
use crate::error::BindError;
use crate::value::is_forbidden_key;

/// Directive names handled by the binder itself.
pub const BUILTIN_DIRECTIVES: [&str; 13] = [
    "state", "computed", "text", "html", "if", "show", "for", "class", "style", "attr", "model", "on", "init",
];

/// A parsed binder attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// The full attribute name.
    pub attribute: String,
    pub name: String,
    pub argument: Option<String>,
    pub modifiers: Vec<String>,
    /// The attribute value.
    pub expression: String,
}

impl Directive {
    /// Parse `attribute` if it carries the configured prefix.
    pub fn parse(config: &BinderConfig, attribute: &str, value: &str) -> Option<Self> {
        let rest = config.strip_prefix(attribute)?;
        let (head, modifiers) = match rest.split_once('.') {
            Some((head, modifiers)) => (head, modifiers.split('.').filter(|m| !m.is_empty()).map(str::to_string).collect()),
            None => (rest, Vec::new()),
        };
        let (name, argument) = match head.split_once(':') {
            Some((name, argument)) => (name, Some(argument.to_string()).filter(|a| !a.is_empty())),
            None => (head, None),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            attribute: attribute.to_string(),
            name: name.to_string(),
            argument,
            modifiers,
            expression: value.trim().to_string(),
        })
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    /// The modifier following `modifier`, as in `.debounce.500ms`.
    pub fn modifier_after(&self, modifier: &str) -> Option<&str> {
        let index = self.modifiers.iter().position(|m| m == modifier)?;
        self.modifiers.get(index + 1).map(String::as_str)
    }

    /// The debounce delay requested by `.debounce[.<n>ms|.<n>s|.<n>]`.
    pub fn debounce(&self, default: Duration) -> Option<Duration> {
        if !self.has_modifier("debounce") {
            return None;
        }
        Some(self.modifier_after("debounce").and_then(parse_duration).unwrap_or(default))
    }

    /// Whether the binder handles this directive itself.
    pub fn is_builtin(&self) -> bool {
        BUILTIN_DIRECTIVES.contains(&self.name.as_str())
    }
}

fn parse_duration(text: &str) -> Option<Duration> {
    if let Some(ms) = text.strip_suffix("ms") {
        return ms.parse().ok().map(Duration::from_millis);
    }
    if let Some(s) = text.strip_suffix('s') {
        return s.parse().ok().map(Duration::from_secs);
    }
    text.parse().ok().map(Duration::from_millis)
}

/// `kebab-case` attribute argument to the `camelCase` scope name.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '-' || c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `camelCase` style property to `kebab-case`.
pub fn to_kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// A parsed list expression: `item in items`, `(item, index) in items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForSpec {
    pub item: String,
    pub index: Option<String>,
    pub source: String,
}

impl ForSpec {
    pub fn parse(expression: &str) -> Result<Self, BindError> {
        let invalid = || BindError::ForSyntax(expression.to_string());
        let (head, source) = split_keyword(expression, " in ")
            .or_else(|| split_keyword(expression, " of "))
            .ok_or_else(invalid)?;
        let source = source.trim();
        if source.is_empty() {
            return Err(invalid());
        }

        let head = head.trim();
        let head = head
            .strip_prefix('(')
            .and_then(|h| h.strip_suffix(')'))
            .unwrap_or(head);
        let mut names = head.split(',').map(str::trim);
        let item = names.next().filter(|n| is_identifier(n)).ok_or_else(invalid)?;
        let index = match names.next() {
            Some(name) if is_identifier(name) => Some(name.to_string()),
            Some(_) => return Err(invalid()),
            None => None,
        };
        if names.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            item: item.to_string(),
            index,
            source: source.to_string(),
        })
    }
}

fn split_keyword<'a>(text: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
    let at = text.find(keyword)?;
    Some((&text[..at], &text[at + keyword.len()..]))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !is_forbidden_key(name)
}
