//! Code block records as emitted by the upstream document parser.

use crate::error::{EngineError, EngineResult};
use crate::domain::GobbleMode;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub const CUSTOM_CODE_PREFIX: &str = "CC:";
pub const HIGHLIGHT_ONLY_PREFIX: &str = "PYG";
pub const EXTERNAL_SESSION_PREFIX: &str = "EXT:";

/// One unit of embedded code, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub family: String,
    pub session: String,
    #[serde(default = "default_restart")]
    pub restart: String,
    pub instance: String,
    pub command: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub args_run: String,
    #[serde(default)]
    pub args_prettyprint: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub line: usize,
}

fn default_restart() -> String {
    "default".to_string()
}

/// What the invoking command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Code,
    Block,
    Inline,
    Sub,
    Verb,
    Console,
}

impl CommandKind {
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "c" | "code" => Some(Self::Code),
            "b" | "block" => Some(Self::Block),
            "i" | "inline" => Some(Self::Inline),
            "s" | "sub" => Some(Self::Sub),
            "v" | "verb" => Some(Self::Verb),
            "cons" | "console" => Some(Self::Console),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomCodePosition {
    Begin,
    End,
}

impl CodeBlock {
    /// `family#session#restart`: the unit of execution.
    pub fn key_run(&self) -> String {
        format!("{}#{}#{}", self.family, self.session, self.restart)
    }

    /// `key_run#instance`: one presentable artifact.
    pub fn key_typeset(&self) -> String {
        format!("{}#{}", self.key_run(), self.instance)
    }

    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::parse(&self.command)
    }

    pub fn is_inline(&self) -> bool {
        self.command.chars().count() == 1
    }

    pub fn is_cc(&self) -> bool {
        self.family.starts_with(CUSTOM_CODE_PREFIX)
    }

    pub fn is_pyg(&self) -> bool {
        self.family.starts_with(HIGHLIGHT_ONLY_PREFIX)
    }

    pub fn is_verb(&self) -> bool {
        self.kind() == Some(CommandKind::Verb)
    }

    pub fn is_cons(&self) -> bool {
        !self.is_cc() && !self.is_pyg() && self.kind() == Some(CommandKind::Console)
    }

    /// Executed inside a regular (non-console) session.
    pub fn is_code(&self) -> bool {
        !self.is_cc()
            && !self.is_pyg()
            && matches!(
                self.kind(),
                Some(CommandKind::Code | CommandKind::Block | CommandKind::Inline | CommandKind::Sub)
            )
    }

    /// Whether the code itself is ever displayed.
    pub fn is_typeset(&self) -> bool {
        !self.is_cc()
            && (self.is_verb() || matches!(self.kind(), Some(CommandKind::Block | CommandKind::Console)))
    }

    /// Output replaces the invoking command rather than landing in a file.
    pub fn is_macro_output(&self) -> bool {
        self.is_inline() || self.kind() == Some(CommandKind::Sub)
    }

    pub fn external_path(&self) -> Option<&str> {
        self.session.strip_prefix(EXTERNAL_SESSION_PREFIX)
    }

    /// Target family and position of a custom code block (`CC:python:begin`).
    pub fn custom_code_target(&self) -> Option<(&str, CustomCodePosition)> {
        let rest = self.family.strip_prefix(CUSTOM_CODE_PREFIX)?;
        let (family, position) = rest.rsplit_once(':')?;
        let position = match position {
            "begin" => CustomCodePosition::Begin,
            "end" => CustomCodePosition::End,
            _ => return None,
        };
        Some((family, position))
    }

    /// Lexer requested by a highlight-only family (`PYGpython` -> `python`).
    pub fn highlight_lexer(&self) -> Option<&str> {
        self.family.strip_prefix(HIGHLIGHT_ONLY_PREFIX).filter(|lexer| !lexer.is_empty())
    }

    pub fn instance_index(&self) -> EngineResult<u64> {
        self.instance.trim().parse::<u64>().map_err(|_| {
            self.malformed(format!("instance '{}' is not a non-negative integer", self.instance))
        })
    }

    /// Reject metadata combinations this engine does not understand.
    pub fn validate(&self) -> EngineResult<()> {
        if self.family.is_empty() || self.session.is_empty() || self.restart.is_empty() {
            return Err(self.malformed("family, session and restart must be non-empty"));
        }
        self.instance_index()?;
        let Some(kind) = self.kind() else {
            return Err(self.malformed(format!("unknown command '{}'", self.command)));
        };
        if self.is_cc() {
            if self.custom_code_target().is_none() {
                return Err(self.malformed("custom code family must be CC:<family>:<begin|end>"));
            }
            if kind != CommandKind::Code {
                return Err(self.malformed("custom code only supports the code command"));
            }
        }
        if self.is_pyg() {
            if self.highlight_lexer().is_none() {
                return Err(self.malformed("highlight-only family is missing a lexer"));
            }
            if kind != CommandKind::Verb {
                return Err(self.malformed("highlight-only family only supports the verb command"));
            }
        }
        if self.external_path().is_some() && !self.is_pyg() {
            return Err(self.malformed("external sources are only valid for highlight-only families"));
        }
        Ok(())
    }

    /// Code with common indentation removed when gobbling is enabled.
    pub fn gobbled_code(&self, mode: GobbleMode) -> Cow<'_, str> {
        match mode {
            GobbleMode::Auto if !self.is_inline() => Cow::Owned(dedent(&self.code)),
            _ => Cow::Borrowed(&self.code),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> EngineError {
        EngineError::MalformedRecord {
            key: self.key_typeset(),
            line: self.line,
            reason: reason.into(),
        }
    }
}

fn dedent(code: &str) -> String {
    let indent = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return code.to_string();
    }
    let mut out = String::with_capacity(code.len());
    for (idx, line) in code.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if !line.trim().is_empty() {
            out.push_str(&line[indent..]);
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn block(family: &str, session: &str, instance: u64, command: &str, code: &str) -> CodeBlock {
    CodeBlock {
        family: family.to_string(),
        session: session.to_string(),
        restart: "default".to_string(),
        instance: instance.to_string(),
        command: command.to_string(),
        context: String::new(),
        args_run: String::new(),
        args_prettyprint: String::new(),
        code: code.to_string(),
        line: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_hash_joined() {
        let b = block("python", "main", 3, "b", "x = 1");
        assert_eq!(b.key_run(), "python#main#default");
        assert_eq!(b.key_typeset(), "python#main#default#3");
    }

    #[test]
    fn flags_follow_family_and_command() {
        assert!(block("python", "main", 0, "c", "").is_code());
        assert!(!block("python", "main", 0, "c", "").is_typeset());
        assert!(block("python", "main", 0, "block", "").is_typeset());
        assert!(block("pycon", "main", 0, "console", "").is_cons());
        assert!(block("PYGpython", "main", 0, "v", "").is_pyg());
        assert!(!block("PYGpython", "main", 0, "v", "").is_code());
        assert!(block("PYGpython", "main", 0, "v", "").is_verb());
        assert!(block("PYGpython", "main", 0, "verb", "").is_typeset());
        assert!(block("CC:python:begin", "main", 0, "code", "").is_cc());
        assert!(block("python", "main", 0, "i", "").is_inline());
        assert!(!block("python", "main", 0, "inline", "").is_inline());
    }

    #[test]
    fn custom_code_target_parses_family_and_position() {
        let b = block("CC:python:end", "main", 0, "code", "");
        assert_eq!(b.custom_code_target(), Some(("python", CustomCodePosition::End)));
        assert!(block("CC:python:middle", "main", 0, "code", "").validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_command_and_bad_instance() {
        assert!(block("python", "main", 0, "zz", "").validate().is_err());
        let mut b = block("python", "main", 0, "c", "");
        b.instance = "x".to_string();
        assert!(b.validate().is_err());
    }

    #[test]
    fn validate_rejects_highlight_only_execution() {
        let err = block("PYGpython", "main", 0, "c", "").validate().expect_err("must reject");
        assert!(err.to_string().contains("verb"));
    }

    #[test]
    fn gobble_auto_dedents_environments_only() {
        let b = block("python", "main", 0, "block", "    x = 1\n    if x:\n        y = 2\n");
        assert_eq!(b.gobbled_code(GobbleMode::Auto), "x = 1\nif x:\n    y = 2\n");
        assert_eq!(b.gobbled_code(GobbleMode::None), b.code);
        let inline = block("python", "main", 0, "i", "  x");
        assert_eq!(inline.gobbled_code(GobbleMode::Auto), "  x");
    }
}
