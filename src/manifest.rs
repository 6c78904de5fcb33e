use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Taps that Homebrew provides without an explicit `tap` line.
const IMPLICIT_TAPS: &[&str] = &["homebrew/core", "homebrew/cask"];

/// Directive keywords accepted in a Brewfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectiveKind {
    Tap,
    Brew,
    Cask,
    Mas,
    Vscode,
}

impl DirectiveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "tap" => Some(DirectiveKind::Tap),
            "brew" => Some(DirectiveKind::Brew),
            "cask" => Some(DirectiveKind::Cask),
            "mas" => Some(DirectiveKind::Mas),
            "vscode" => Some(DirectiveKind::Vscode),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveKind::Tap => "tap",
            DirectiveKind::Brew => "brew",
            DirectiveKind::Cask => "cask",
            DirectiveKind::Mas => "mas",
            DirectiveKind::Vscode => "vscode",
        }
    }

    fn known_options(self) -> &'static [&'static str] {
        match self {
            DirectiveKind::Tap => &["force_auto_update"],
            DirectiveKind::Brew => &[
                "args",
                "conflicts_with",
                "link",
                "postinstall",
                "restart_service",
                "start_service",
                "version_file",
            ],
            DirectiveKind::Cask => &["args", "greedy", "postinstall"],
            DirectiveKind::Mas => &["id"],
            DirectiveKind::Vscode => &[],
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value on the right-hand side of `key: value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(String),
    List(Vec<OptionValue>),
    Map(Vec<(String, OptionValue)>),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(value) => write!(f, "{value}"),
            OptionValue::Int(value) => write!(f, "{value}"),
            OptionValue::Str(value) => write_quoted(f, value),
            OptionValue::Symbol(value) => write!(f, ":{value}"),
            OptionValue::List(values) => {
                f.write_str("[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            OptionValue::Map(entries) => {
                f.write_str("{ ")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in value.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

/// A single `tap`/`brew`/`cask`/`mas`/`vscode` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Package, tap, or application name.
    pub name: String,
    /// Custom clone URL; only valid on `tap`.
    pub source: Option<String>,
    /// Options in declaration order.
    pub options: Vec<(String, OptionValue)>,
    /// Trailing `# ...` comment without the marker.
    pub comment: Option<String>,
}

impl Directive {
    pub fn new(kind: DirectiveKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            source: None,
            options: Vec::new(),
            comment: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: OptionValue) -> Self {
        self.options.push((key.into(), value));
        self
    }

    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Tap a fully-qualified formula or cask (`org/repo/name`) comes from.
    pub fn tap(&self) -> Option<String> {
        if !matches!(self.kind, DirectiveKind::Brew | DirectiveKind::Cask) {
            return None;
        }

        let parts: Vec<&str> = self.name.split('/').collect();
        if parts.len() == 3 && parts.iter().all(|part| !part.is_empty()) {
            Some(format!("{}/{}", parts[0], parts[1]).to_lowercase())
        } else {
            None
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.kind)?;
        write_quoted(f, &self.name)?;
        if let Some(source) = &self.source {
            f.write_str(", ")?;
            write_quoted(f, source)?;
        }
        for (key, value) in &self.options {
            write!(f, ", {key}: {value}")?;
        }
        if let Some(comment) = &self.comment {
            write!(f, " # {comment}")?;
        }
        Ok(())
    }
}

impl FromStr for Directive {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_directive(s.trim(), 1)
    }
}

/// Failure to parse a manifest line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: unknown directive '{kind}'")]
    UnknownDirective { line: usize, kind: String },

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    Blank,
    Comment(String),
    Directive(Directive),
}

/// A parsed Brewfile. Every source line maps to one [`ManifestLine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub path: Option<PathBuf>,
    lines: Vec<ManifestLine>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            let line = if trimmed.is_empty() {
                ManifestLine::Blank
            } else if trimmed.starts_with('#') {
                ManifestLine::Comment(trimmed.to_string())
            } else {
                ManifestLine::Directive(parse_directive(trimmed, idx + 1)?)
            };
            lines.push(line);
        }

        Ok(Self { path: None, lines })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        let mut manifest =
            Self::parse(&contents).with_context(|| format!("Failed to parse manifest {:?}", path))?;
        manifest.path = Some(path.to_path_buf());
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        fs::write(path, self.to_string())
            .with_context(|| format!("Failed to write manifest {:?}", path))
    }

    pub fn lines(&self) -> &[ManifestLine] {
        &self.lines
    }

    pub fn push(&mut self, directive: Directive) {
        self.lines.push(ManifestLine::Directive(directive));
    }

    /// Directives paired with their 1-based line numbers.
    pub fn directives(&self) -> impl Iterator<Item = (usize, &Directive)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| match line {
                ManifestLine::Directive(directive) => Some((idx + 1, directive)),
                _ => None,
            })
    }

    pub fn of_kind(&self, kind: DirectiveKind) -> impl Iterator<Item = &Directive> {
        self.directives()
            .map(|(_, directive)| directive)
            .filter(move |directive| directive.kind == kind)
    }

    pub fn taps(&self) -> impl Iterator<Item = &Directive> {
        self.of_kind(DirectiveKind::Tap)
    }

    pub fn len(&self) -> usize {
        self.directives().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check ordering, duplicates, and option values.
    pub fn validate(&self) -> Vec<ManifestIssue> {
        let mut issues = Vec::new();

        let mut taps: HashMap<String, usize> = HashMap::new();
        for (line, directive) in self.directives() {
            if directive.kind == DirectiveKind::Tap {
                taps.entry(directive.name.to_lowercase()).or_insert(line);
            }
        }

        let mut seen: HashMap<(DirectiveKind, String), usize> = HashMap::new();
        for (line, directive) in self.directives() {
            let key = (directive.kind, directive.name.to_lowercase());
            if let Some(first) = seen.get(&key) {
                issues.push(ManifestIssue::warning(
                    line,
                    format!(
                        "{} '{}' is already declared on line {first}",
                        directive.kind, directive.name
                    ),
                ));
            } else {
                seen.insert(key, line);
            }

            if let Some(tap) = directive.tap() {
                match taps.get(&tap) {
                    Some(declared) if *declared > line => issues.push(ManifestIssue::error(
                        line,
                        format!(
                            "tap '{tap}' for '{}' is declared later, on line {declared}",
                            directive.name
                        ),
                    )),
                    None if !IMPLICIT_TAPS.contains(&tap.as_str()) => {
                        issues.push(ManifestIssue::warning(
                            line,
                            format!("tap '{tap}' for '{}' is never declared", directive.name),
                        ))
                    }
                    _ => {}
                }
            }

            for (key, value) in &directive.options {
                if !directive.kind.known_options().contains(&key.as_str()) {
                    issues.push(ManifestIssue::warning(
                        line,
                        format!("unknown option '{key}' for {}", directive.kind),
                    ));
                    continue;
                }

                let valid = match key.as_str() {
                    "restart_service" => matches!(value, OptionValue::Bool(_))
                        || *value == OptionValue::Symbol("changed".into()),
                    "link" => matches!(value, OptionValue::Bool(_))
                        || *value == OptionValue::Symbol("overwrite".into()),
                    "id" => matches!(value, OptionValue::Int(_)),
                    _ => true,
                };
                if !valid {
                    issues.push(ManifestIssue::error(
                        line,
                        format!("invalid value {value} for option '{key}'"),
                    ));
                }
            }

            if directive.source.is_some() && directive.kind != DirectiveKind::Tap {
                issues.push(ManifestIssue::error(
                    line,
                    format!("{} does not accept a source URL", directive.kind),
                ));
            }

            if directive.kind == DirectiveKind::Mas && directive.option("id").is_none() {
                issues.push(ManifestIssue::error(
                    line,
                    format!("mas '{}' requires an integer id", directive.name),
                ));
            }
        }

        issues.sort_by_key(|issue| issue.line);
        issues
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                ManifestLine::Blank => writeln!(f)?,
                ManifestLine::Comment(text) => writeln!(f, "{text}")?,
                ManifestLine::Directive(directive) => writeln!(f, "{directive}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// Problem found by [`Manifest::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIssue {
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

impl ManifestIssue {
    fn warning(line: usize, message: String) -> Self {
        Self {
            line,
            severity: Severity::Warning,
            message,
        }
    }

    fn error(line: usize, message: String) -> Self {
        Self {
            line,
            severity: Severity::Error,
            message,
        }
    }
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    text: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line,
            text,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.line,
            message: format!("{} in '{}'", message.into(), self.text),
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        match self.bump() {
            Some(ch) if ch == expected => Ok(()),
            Some(ch) => Err(self.error(format!("expected '{expected}', found '{ch}'"))),
            None => Err(self.error(format!("expected '{expected}'"))),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn string(&mut self) -> Result<String, ParseError> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some(ch) => value.push(ch),
                    None => return Err(self.error("unterminated string")),
                },
                Some(ch) => value.push(ch),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn value(&mut self) -> Result<OptionValue, ParseError> {
        match self.peek() {
            Some('"') => self.string().map(OptionValue::Str),
            Some(':') => {
                self.bump();
                let symbol = self.ident();
                if symbol.is_empty() {
                    return Err(self.error("empty symbol"));
                }
                Ok(OptionValue::Symbol(symbol))
            }
            Some('[') => {
                self.bump();
                let mut values = Vec::new();
                loop {
                    self.skip_ws();
                    if self.peek() == Some(']') {
                        self.bump();
                        return Ok(OptionValue::List(values));
                    }
                    values.push(self.value()?);
                    self.skip_ws();
                    match self.bump() {
                        Some(',') => continue,
                        Some(']') => return Ok(OptionValue::List(values)),
                        _ => return Err(self.error("unterminated list")),
                    }
                }
            }
            Some('{') => {
                self.bump();
                let mut entries = Vec::new();
                loop {
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.bump();
                        return Ok(OptionValue::Map(entries));
                    }
                    let key = self.ident();
                    if key.is_empty() {
                        return Err(self.error("expected a key"));
                    }
                    self.expect(':')?;
                    self.skip_ws();
                    entries.push((key, self.value()?));
                    self.skip_ws();
                    match self.bump() {
                        Some(',') => continue,
                        Some('}') => return Ok(OptionValue::Map(entries)),
                        _ => return Err(self.error("unterminated hash")),
                    }
                }
            }
            Some(ch) if ch.is_ascii_digit() || ch == '-' => {
                let start = self.pos;
                self.bump();
                while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                    self.pos += 1;
                }
                let literal: String = self.chars[start..self.pos].iter().collect();
                literal
                    .parse()
                    .map(OptionValue::Int)
                    .map_err(|_| self.error(format!("invalid integer '{literal}'")))
            }
            Some(_) => match self.ident().as_str() {
                "true" => Ok(OptionValue::Bool(true)),
                "false" => Ok(OptionValue::Bool(false)),
                "" => Err(self.error("expected a value")),
                other => Err(self.error(format!("unexpected value '{other}'"))),
            },
            None => Err(self.error("expected a value")),
        }
    }
}

fn parse_directive(text: &str, line: usize) -> Result<Directive, ParseError> {
    let mut cursor = Cursor::new(text, line);
    cursor.skip_ws();

    let keyword = cursor.ident();
    let kind = DirectiveKind::from_name(&keyword).ok_or_else(|| ParseError::UnknownDirective {
        line,
        kind: if keyword.is_empty() {
            text.split_whitespace().next().unwrap_or_default().to_string()
        } else {
            keyword.clone()
        },
    })?;

    cursor.skip_ws();
    let mut directive = Directive::new(kind, cursor.string()?);
    if directive.name.is_empty() {
        return Err(cursor.error("empty name"));
    }

    loop {
        cursor.skip_ws();
        match cursor.peek() {
            None => break,
            Some('#') => {
                cursor.bump();
                directive.comment = Some(cursor.rest().trim().to_string());
                break;
            }
            Some(',') => {
                cursor.bump();
                cursor.skip_ws();
            }
            Some(ch) => return Err(cursor.error(format!("unexpected '{ch}'"))),
        }

        if cursor.peek() == Some('"') {
            if directive.source.is_some() || !directive.options.is_empty() {
                return Err(cursor.error("unexpected positional argument"));
            }
            directive.source = Some(cursor.string()?);
            continue;
        }

        let key = cursor.ident();
        if key.is_empty() {
            return Err(cursor.error("expected an option name"));
        }
        cursor.expect(':')?;
        cursor.skip_ws();
        let value = cursor.value()?;
        directive.options.push((key, value));
    }

    Ok(directive)
}
