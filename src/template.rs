//! Typed command templates
//!
//! A command template is a token list in which `%NAME%` placeholders are parsed
//! into `Param` values up front. Unknown placeholder names are rejected when the
//! template is built, and resolution against a `ParamMap` fails on the first
//! placeholder that has no value instead of passing it through literally.
//!
//! A `%` that does not open a well-formed `%NAME%` (for example the host wildcard
//! in `'%USER%'@'%'`) is kept as a literal character.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::types::{Action, Param};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Param),
}

/// One parsed token of a command line
#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenTemplate {
    segments: Vec<Segment>,
}

impl TokenTemplate {
    fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(start) = rest.find('%') {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let candidate = after.find('%').map(|end| &after[..end]);

            match candidate {
                Some(name) if is_placeholder_name(name) => {
                    let param = Param::from_str(name).map_err(|_| {
                        StackError::template(format!(
                            "unknown placeholder %{name}% in token '{raw}'"
                        ))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(param));
                    rest = &after[name.len() + 1..];
                }
                _ => {
                    literal.push('%');
                    rest = after;
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    fn resolve(&self, params: &ParamMap) -> std::result::Result<String, Param> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(param) => out.push_str(params.get(*param).ok_or(*param)?),
            }
        }
        Ok(out)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// A parsed, validated command line with named placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: Vec<String>,
    tokens: Vec<TokenTemplate>,
}

impl CommandTemplate {
    /// Parse a token list. The list must be non-empty and every `%NAME%` must
    /// name a known `Param`.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        if tokens.is_empty() {
            return Err(StackError::template("command template has no tokens"));
        }
        let raw: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();
        let tokens = raw
            .iter()
            .map(|t| TokenTemplate::parse(t))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { raw, tokens })
    }

    /// Tokens as written, placeholders unresolved
    pub fn raw_tokens(&self) -> &[String] {
        &self.raw
    }

    /// Every parameter referenced anywhere in the template
    pub fn placeholders(&self) -> BTreeSet<Param> {
        self.tokens
            .iter()
            .flat_map(|t| t.segments.iter())
            .filter_map(|s| match s {
                Segment::Placeholder(p) => Some(*p),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every placeholder. Returns the first parameter that has no
    /// value in `params`.
    pub fn bind(&self, params: &ParamMap) -> std::result::Result<Vec<String>, Param> {
        self.tokens.iter().map(|t| t.resolve(params)).collect()
    }

    /// Substitute and wrap into a command ready for an executor
    pub fn resolve(
        &self,
        params: &ParamMap,
        run_as_root: bool,
        action: Action,
        service_type: &str,
    ) -> Result<ResolvedCommand> {
        let argv = self
            .bind(params)
            .map_err(|param| StackError::UnresolvedPlaceholder {
                action,
                service_type: service_type.to_string(),
                placeholder: param.to_string(),
            })?;
        Ok(ResolvedCommand {
            argv,
            run_as_root,
            secrets: params.secret_values(),
        })
    }
}

impl Serialize for CommandTemplate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CommandTemplate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A template plus the privilege it runs with, as listed for package hooks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub cmd: CommandTemplate,
    #[serde(default)]
    pub run_as_root: bool,
}

impl CommandSpec {
    pub fn resolve(
        &self,
        params: &ParamMap,
        action: Action,
        service_type: &str,
    ) -> Result<ResolvedCommand> {
        self.cmd.resolve(params, self.run_as_root, action, service_type)
    }
}

/// Immutable parameter values for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    values: BTreeMap<Param, String>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, param: Param) -> Option<&str> {
        self.values.get(&param).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn secret_values(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|(p, v)| p.is_secret() && !v.is_empty())
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl FromIterator<(Param, String)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (Param, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Fully substituted command line handed to a `CommandExecutor`
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    argv: Vec<String>,
    run_as_root: bool,
    secrets: Vec<String>,
}

impl ResolvedCommand {
    /// Build a command with no secrets to hide, e.g. a package-manager call
    pub fn new(argv: Vec<String>, run_as_root: bool) -> Self {
        Self {
            argv,
            run_as_root,
            secrets: Vec::new(),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn run_as_root(&self) -> bool {
        self.run_as_root
    }

    /// Command line with secret values replaced, safe for logs and errors
    pub fn redacted(&self) -> String {
        self.argv
            .iter()
            .map(|token| {
                self.secrets
                    .iter()
                    .fold(token.clone(), |acc, secret| acc.replace(secret.as_str(), "***"))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCommand")
            .field("argv", &self.redacted())
            .field("run_as_root", &self.run_as_root)
            .finish()
    }
}
