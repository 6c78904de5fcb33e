//! Declarative subset of zsh/POSIX shell used by startup and alias files.
//!
//! Only assignments, arrays, aliases, exports, and `source` are interpreted.
//! Everything else is kept as [`Statement::Unsupported`] so callers can report
//! it; nothing is ever executed.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Input ended inside a quote or array.
    #[error("line {line}: {message}")]
    Unterminated { line: usize, message: String },
}

/// Piece of a shell word. `Literal` text came from single quotes or escapes
/// and must not be expanded. `Quoted` text came from double quotes and only
/// gets parameter expansion; `Expand` is unquoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Literal(String),
    Quoted(String),
    Expand(String),
}

impl Part {
    pub fn text(&self) -> &str {
        match self {
            Part::Literal(text) | Part::Quoted(text) | Part::Expand(text) => text,
        }
    }
}

/// A shell word with quotes removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Word {
    parts: Vec<Part>,
}

impl Word {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Literal(text.into())],
        }
    }

    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Expand(text.into())],
        }
    }

    /// Word written entirely inside double quotes.
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Quoted(text.into())],
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Text with quoting removed and nothing expanded.
    pub fn text(&self) -> String {
        self.parts.iter().map(Part::text).collect()
    }

    pub fn has_substitution(&self) -> bool {
        self.parts.iter().any(|part| match part {
            Part::Expand(text) | Part::Quoted(text) => text.contains("$(") || text.contains('`'),
            Part::Literal(_) => false,
        })
    }

    fn push_literal(&mut self, ch: char) {
        match self.parts.last_mut() {
            Some(Part::Literal(text)) => text.push(ch),
            _ => self.parts.push(Part::Literal(ch.to_string())),
        }
    }

    fn push_expand(&mut self, ch: char) {
        match self.parts.last_mut() {
            Some(Part::Expand(text)) => text.push(ch),
            _ => self.parts.push(Part::Expand(ch.to_string())),
        }
    }

    fn push_quoted(&mut self, ch: char) {
        match self.parts.last_mut() {
            Some(Part::Quoted(text)) => text.push(ch),
            _ => self.parts.push(Part::Quoted(ch.to_string())),
        }
    }

    fn bare_text(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [Part::Expand(text)] => Some(text),
            _ => None,
        }
    }

    /// Split `name=value` at the first unquoted `=`.
    fn split_at_equals(&self) -> Option<(String, Word)> {
        let Some(Part::Expand(first)) = self.parts.first() else {
            return None;
        };
        let (name, rest) = first.split_once('=')?;
        if name.is_empty() {
            return None;
        }

        let mut value = Word::default();
        if !rest.is_empty() {
            value.parts.push(Part::Expand(rest.to_string()));
        }
        value.parts.extend(self.parts[1..].iter().cloned());
        Some((name.to_string(), value))
    }

    fn assignment(&self) -> Option<(String, Word)> {
        self.split_at_equals()
            .filter(|(name, _)| is_identifier(name))
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `NAME=value` or `export NAME=value`.
    Assign {
        name: String,
        value: Word,
        exported: bool,
    },
    /// `export NAME` without a value.
    Export { name: String },
    /// `name=(a b c)`.
    Array { name: String, items: Vec<Word> },
    /// `alias name=value`; the value is stored unexpanded. `global` is set
    /// by zsh's `alias -g`.
    Alias {
        name: String,
        value: String,
        global: bool,
    },
    /// `source path` or `. path`.
    Source { path: Word },
    Unsupported { text: String, reason: &'static str },
}

/// Statement with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub line: usize,
    pub statement: Statement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub path: Option<PathBuf>,
    statements: Vec<Located>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut statements = Vec::new();
        let mut idx = 0;

        while idx < lines.len() {
            let start = idx;
            let trimmed = lines[idx].trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                idx += 1;
                continue;
            }

            if let Some(block) = Block::detect(trimmed) {
                let end = block.end(&lines, start)?;
                statements.push(Located {
                    line: start + 1,
                    statement: Statement::Unsupported {
                        text: lines[start..=end].join("\n"),
                        reason: block.reason(),
                    },
                });
                idx = end + 1;
                continue;
            }

            let mut logical = String::new();
            loop {
                let current = lines[idx];
                idx += 1;
                match strip_continuation(current) {
                    Some(stripped) if idx < lines.len() => {
                        logical.push_str(stripped);
                        continue;
                    }
                    Some(stripped) => logical.push_str(stripped),
                    None => logical.push_str(current),
                }

                match Lexer::new(&logical, start + 1).tokens() {
                    Ok(tokens) => {
                        let heredocs = Heredoc::find(&tokens);
                        let mut built = build_statements(tokens, logical.trim());

                        // Here-document bodies belong to the command that opened them.
                        let body_start = idx;
                        for heredoc in &heredocs {
                            idx = heredoc.skip_body(&lines, idx);
                        }
                        if let Some(Statement::Unsupported { text, .. }) = built.last_mut() {
                            for line in &lines[body_start..idx] {
                                text.push('\n');
                                text.push_str(line);
                            }
                        }

                        statements.extend(built.into_iter().map(|statement| Located {
                            line: start + 1,
                            statement,
                        }));
                        break;
                    }
                    Err(ScriptError::Unterminated { .. }) if idx < lines.len() => {
                        logical.push('\n');
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(Self {
            path: None,
            statements,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read shell file {:?}", path))?;
        let mut script =
            Self::parse(&contents).with_context(|| format!("Failed to parse shell file {:?}", path))?;
        script.path = Some(path.to_path_buf());
        Ok(script)
    }

    pub fn statements(&self) -> &[Located] {
        &self.statements
    }

    /// Statements that will be skipped when the script is applied.
    pub fn unsupported(&self) -> impl Iterator<Item = (usize, &str, &'static str)> {
        self.statements.iter().filter_map(|located| match &located.statement {
            Statement::Unsupported { text, reason } => Some((located.line, text.as_str(), *reason)),
            _ => None,
        })
    }
}

/// `name() {`, `name(){`, or `name ()`.
fn is_function_header(line: &str) -> bool {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return false;
    };

    let (name, rest) = match head.split_once("()") {
        Some(split) => split,
        None if words.next().is_some_and(|word| word.starts_with("()")) => (head, ""),
        None => return false,
    };

    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':'))
        && (rest.is_empty() || rest == "{")
}

/// Returns the line without its trailing backslash when it continues onto the next.
fn strip_continuation(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|ch| *ch == '\\').count();
    (trailing % 2 == 1).then(|| &line[..line.len() - 1])
}

enum Block {
    Keyword {
        opens: &'static [&'static str],
        close: &'static str,
    },
    Function,
}

impl Block {
    fn detect(line: &str) -> Option<Self> {
        let first = line
            .split(|ch: char| ch.is_whitespace() || ch == ';')
            .next()?;

        match first {
            "if" => Some(Block::Keyword {
                opens: &["if"],
                close: "fi",
            }),
            "case" => Some(Block::Keyword {
                opens: &["case"],
                close: "esac",
            }),
            "for" | "while" | "until" | "select" => Some(Block::Keyword {
                opens: &["for", "while", "until", "select"],
                close: "done",
            }),
            "function" => Some(Block::Function),
            _ if is_function_header(line) => Some(Block::Function),
            _ => None,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            Block::Keyword { .. } => "control flow",
            Block::Function => "function definition",
        }
    }

    /// Index of the line that closes the block starting at `start`.
    ///
    /// Lines are tokenized so that quoted text, comments, and here-document
    /// bodies never open or close the block.
    fn end(&self, lines: &[&str], start: usize) -> Result<usize, ScriptError> {
        let mut depth: i32 = 0;
        let mut opened = false;
        let mut idx = start;

        while idx < lines.len() {
            let mut text = lines[idx].to_string();
            let tokens = loop {
                match Lexer::new(&text, idx + 1).tokens() {
                    Ok(tokens) => break Some(tokens),
                    Err(ScriptError::Unterminated { .. }) if idx + 1 < lines.len() => {
                        idx += 1;
                        text.push('\n');
                        text.push_str(lines[idx]);
                    }
                    Err(_) => break None,
                }
            };
            idx += 1;

            match tokens {
                Some(tokens) => {
                    self.count_tokens(&tokens, &mut depth, &mut opened);
                    for heredoc in Heredoc::find(&tokens) {
                        idx = heredoc.skip_body(lines, idx);
                    }
                }
                None => self.count_text(&text, &mut depth, &mut opened),
            }

            if opened && depth <= 0 {
                return Ok(idx - 1);
            }
        }

        Err(ScriptError::Syntax {
            line: start + 1,
            message: format!("unterminated {}", self.reason()),
        })
    }

    fn count_tokens(&self, tokens: &[Token], depth: &mut i32, opened: &mut bool) {
        match self {
            Block::Keyword { opens, close } => {
                let mut command_start = true;
                for token in tokens {
                    match token {
                        Token::Word(word) => {
                            let bare = word.bare_text();
                            if let Some(text) = bare.filter(|_| command_start) {
                                if opens.contains(&text) {
                                    *depth += 1;
                                    *opened = true;
                                } else if text == *close {
                                    *depth -= 1;
                                }
                            }
                            command_start = bare.is_some_and(|text| COMMAND_PREFIXES.contains(&text));
                        }
                        Token::Array { .. } => command_start = false,
                        Token::Separator | Token::Operator(_) => command_start = true,
                    }
                }
            }
            Block::Function => {
                for token in tokens {
                    let Token::Word(word) = token else {
                        continue;
                    };
                    for part in word.parts() {
                        if let Part::Expand(text) = part {
                            count_braces(text, depth, opened);
                        }
                    }
                }
            }
        }
    }

    /// Fallback for lines the lexer rejects.
    fn count_text(&self, text: &str, depth: &mut i32, opened: &mut bool) {
        match self {
            Block::Keyword { opens, close } => {
                for word in text
                    .split(|ch: char| ch.is_whitespace() || ch == ';')
                    .take_while(|word| !word.starts_with('#'))
                {
                    if opens.contains(&word) {
                        *depth += 1;
                        *opened = true;
                    } else if word == *close {
                        *depth -= 1;
                    }
                }
            }
            Block::Function => count_braces(text, depth, opened),
        }
    }
}

/// Reserved words that are followed by another command.
const COMMAND_PREFIXES: &[&str] = &[
    "if", "then", "elif", "else", "while", "until", "do", "!", "{", "time",
];

fn count_braces(text: &str, depth: &mut i32, opened: &mut bool) {
    for ch in text.chars() {
        match ch {
            '{' => {
                *depth += 1;
                *opened = true;
            }
            '}' => *depth -= 1,
            _ => {}
        }
    }
}

/// `<<WORD` or `<<-WORD` redirection.
#[derive(Debug, PartialEq, Eq)]
struct Heredoc {
    delimiter: String,
    strip_tabs: bool,
}

impl Heredoc {
    fn find(tokens: &[Token]) -> Vec<Heredoc> {
        let mut found = Vec::new();
        let mut tokens = tokens.iter();

        while let Some(token) = tokens.next() {
            let Token::Operator(op) = token else {
                continue;
            };
            if !op.ends_with("<<") || op.ends_with("<<<") {
                continue;
            }
            let Some(Token::Word(word)) = tokens.next() else {
                continue;
            };

            let mut delimiter = word.text();
            let strip_tabs = delimiter.starts_with('-');
            if strip_tabs {
                delimiter.remove(0);
                if delimiter.is_empty() {
                    match tokens.next() {
                        Some(Token::Word(word)) => delimiter = word.text(),
                        _ => continue,
                    }
                }
            }
            found.push(Heredoc {
                delimiter,
                strip_tabs,
            });
        }

        found
    }

    /// Index of the first line after the body that starts at `idx`. An
    /// unterminated body runs to the end of the input.
    fn skip_body(&self, lines: &[&str], mut idx: usize) -> usize {
        while idx < lines.len() {
            let line = lines[idx];
            idx += 1;
            let line = if self.strip_tabs {
                line.trim_start_matches('\t')
            } else {
                line
            };
            if line == self.delimiter {
                break;
            }
        }
        idx
    }
}

#[derive(Debug)]
enum Token {
    Word(Word),
    Array { name: String, items: Vec<Word> },
    Separator,
    Operator(String),
}

fn is_operator(ch: char) -> bool {
    matches!(ch, '(' | ')' | '|' | '&' | '<' | '>')
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    fn new(text: &str, line: usize) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line,
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

    fn unterminated(&self, what: &str) -> ScriptError {
        ScriptError::Unterminated {
            line: self.line,
            message: format!("unterminated {what}"),
        }
    }

    fn skip_blank(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.bump() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn tokens(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_blank();
            let Some(ch) = self.peek() else {
                break;
            };

            match ch {
                '#' => self.skip_comment(),
                ';' => {
                    self.pos += 1;
                    tokens.push(Token::Separator);
                }
                ch if is_operator(ch) => {
                    let mut op = String::new();
                    while let Some(next) = self.peek().filter(|next| is_operator(*next)) {
                        op.push(next);
                        self.pos += 1;
                    }
                    tokens.push(Token::Operator(op));
                }
                _ => {
                    let word = self.word()?;
                    let array_name = word
                        .assignment()
                        .filter(|(_, value)| value.parts.is_empty())
                        .map(|(name, _)| name);

                    match array_name {
                        Some(name) if self.peek() == Some('(') => {
                            self.pos += 1;
                            let items = self.array_items()?;
                            tokens.push(Token::Array { name, items });
                        }
                        _ => tokens.push(Token::Word(word)),
                    }
                }
            }
        }

        Ok(tokens)
    }

    fn word(&mut self) -> Result<Word, ScriptError> {
        let mut word = Word::default();
        let mut quoted = false;

        while let Some(ch) = self.peek() {
            match ch {
                ch if ch.is_whitespace() || ch == ';' || is_operator(ch) => break,
                '\'' => {
                    self.pos += 1;
                    quoted = true;
                    loop {
                        match self.bump() {
                            Some('\'') => break,
                            Some(ch) => word.push_literal(ch),
                            None => return Err(self.unterminated("single quote")),
                        }
                    }
                }
                '"' => {
                    self.pos += 1;
                    quoted = true;
                    loop {
                        match self.bump() {
                            Some('"') => break,
                            Some('\\') => match self.peek() {
                                Some(next @ ('"' | '\\' | '$' | '`')) => {
                                    self.pos += 1;
                                    word.push_literal(next);
                                }
                                Some('\n') => self.pos += 1,
                                _ => word.push_quoted('\\'),
                            },
                            Some(ch) => word.push_quoted(ch),
                            None => return Err(self.unterminated("double quote")),
                        }
                    }
                }
                '\\' => {
                    self.pos += 1;
                    if let Some(next) = self.bump() {
                        word.push_literal(next);
                    }
                }
                ch => {
                    self.pos += 1;
                    word.push_expand(ch);
                }
            }
        }

        // `''` and `""` still produce an (empty) word.
        if quoted && word.parts.is_empty() {
            word.parts.push(Part::Literal(String::new()));
        }

        Ok(word)
    }

    fn array_items(&mut self) -> Result<Vec<Word>, ScriptError> {
        let mut items = Vec::new();

        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(self.unterminated("array")),
                Some(')') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some('#') => self.skip_comment(),
                Some(ch) if ch == ';' || is_operator(ch) => {
                    return Err(ScriptError::Syntax {
                        line: self.line,
                        message: format!("unexpected '{ch}' in array"),
                    })
                }
                Some(_) => items.push(self.word()?),
            }
        }
    }
}

fn build_statements(tokens: Vec<Token>, text: &str) -> Vec<Statement> {
    let unsupported = |reason| Statement::Unsupported {
        text: text.to_string(),
        reason,
    };

    if tokens.iter().any(|token| matches!(token, Token::Operator(_))) {
        return vec![unsupported("pipeline, subshell, or redirection")];
    }

    let mut statements = Vec::new();
    let mut command = Vec::new();
    for token in tokens.into_iter().chain(std::iter::once(Token::Separator)) {
        match token {
            Token::Separator => {
                if !command.is_empty() {
                    statements.extend(command_statements(std::mem::take(&mut command), text));
                }
            }
            other => command.push(other),
        }
    }
    statements
}

fn command_statements(tokens: Vec<Token>, text: &str) -> Vec<Statement> {
    let unsupported = |reason| {
        vec![Statement::Unsupported {
            text: text.to_string(),
            reason,
        }]
    };

    let mut words = Vec::new();
    let mut array = None;
    for token in tokens {
        match token {
            Token::Word(word) => words.push(word),
            Token::Array { name, items } if array.is_none() => array = Some((name, items)),
            _ => return unsupported("command"),
        }
    }

    if let Some((name, items)) = array {
        if !words.is_empty() {
            return unsupported("command");
        }
        if items.iter().any(Word::has_substitution) {
            return unsupported("command substitution");
        }
        return vec![Statement::Array { name, items }];
    }

    if words.iter().any(Word::has_substitution) {
        return unsupported("command substitution");
    }

    let Some(first) = words.first() else {
        return Vec::new();
    };

    match first.bare_text() {
        Some("export") => {
            let mut statements = Vec::new();
            for word in &words[1..] {
                if let Some((name, value)) = word.assignment() {
                    statements.push(Statement::Assign {
                        name,
                        value,
                        exported: true,
                    });
                } else if word.bare_text().is_some_and(is_identifier) {
                    statements.push(Statement::Export { name: word.text() });
                } else {
                    return unsupported("export option");
                }
            }
            statements
        }
        Some("alias") => {
            let mut global = false;
            let mut rest = &words[1..];
            while let Some(flags) = rest
                .first()
                .and_then(Word::bare_text)
                .and_then(|text| text.strip_prefix('-'))
            {
                rest = &rest[1..];
                if flags == "-" {
                    break;
                }
                for flag in flags.chars() {
                    match flag {
                        'g' => global = true,
                        'r' => global = false,
                        _ => return unsupported("alias option"),
                    }
                }
            }

            let mut statements = Vec::new();
            for word in rest {
                match word.split_at_equals() {
                    Some((name, value)) => statements.push(Statement::Alias {
                        name,
                        value: value.text(),
                        global,
                    }),
                    None => return unsupported("alias lookup"),
                }
            }
            statements
        }
        Some("source") | Some(".") if words.len() == 2 => vec![Statement::Source {
            path: words[1].clone(),
        }],
        _ => {
            let assignments: Vec<_> = words.iter().filter_map(Word::assignment).collect();
            if assignments.len() == words.len() {
                assignments
                    .into_iter()
                    .map(|(name, value)| Statement::Assign {
                        name,
                        value,
                        exported: false,
                    })
                    .collect()
            } else {
                unsupported("command")
            }
        }
    }
}
