//! Syntax highlighting of displayed code.
//!
//! Highlighting is an external service; this module only decides what to feed
//! it and where the result lands (inline in the store, or in its own file when
//! it is longer than the `fvextfile` threshold).

use crate::domain::{ExitStatus, HighlightEntry, Settings};
use crate::utils::{file_stem_for_key, json_hash, read_text_file, write_text_file};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

pub trait Highlighter: Send + Sync {
    /// Changes whenever previously highlighted output would look different.
    fn fingerprint(&self) -> String;

    fn highlight(&self, code: &str, lexer: &str) -> Result<String>;
}

/// Verbatim output with LaTeX-special characters escaped.
pub struct PlainHighlighter {
    style: String,
}

impl PlainHighlighter {
    pub fn new(style: impl Into<String>) -> Self {
        Self { style: style.into() }
    }
}

impl Highlighter for PlainHighlighter {
    fn fingerprint(&self) -> String {
        json_hash(&("plain", &self.style))
    }

    fn highlight(&self, code: &str, _lexer: &str) -> Result<String> {
        let mut out = String::from("\\begin{Verbatim}[commandchars=\\\\\\{\\}]\n");
        for line in code.lines() {
            for c in line.chars() {
                match c {
                    '\\' => out.push_str("\\PYZbs{}"),
                    '{' => out.push_str("\\PYZob{}"),
                    '}' => out.push_str("\\PYZcb{}"),
                    _ => out.push(c),
                }
            }
            out.push('\n');
        }
        out.push_str("\\end{Verbatim}\n");
        Ok(out)
    }
}

/// Pipes code through an external highlighter such as `pygmentize`.
pub struct CommandHighlighter {
    argv: Vec<String>,
    style: String,
}

impl CommandHighlighter {
    pub fn new(argv: Vec<String>, style: impl Into<String>) -> Self {
        Self { argv, style: style.into() }
    }
}

impl Highlighter for CommandHighlighter {
    fn fingerprint(&self) -> String {
        json_hash(&("command", &self.argv, &self.style))
    }

    fn highlight(&self, code: &str, lexer: &str) -> Result<String> {
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| arg.replace("{lexer}", lexer).replace("{style}", &self.style))
            .collect();
        let Some((program, args)) = argv.split_first() else {
            bail!("Highlighter command is empty");
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn highlighter {program}"))?;
        // Feed stdin from its own thread while wait_with_output drains stdout
        // and stderr; a large input would otherwise fill both pipes.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = code.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&input))
        });
        let output = child.wait_with_output()?;
        let written = match writer {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("Highlighter input thread panicked"))?,
            None => Ok(()),
        };
        if !output.status.success() {
            bail!(
                "Highlighter {} failed ({}): {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        written.with_context(|| format!("Failed writing to highlighter {program}"))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub fn highlighter_from_settings(settings: &Settings) -> Box<dyn Highlighter> {
    match &settings.highlight.command {
        Some(argv) if !argv.is_empty() => {
            Box::new(CommandHighlighter::new(argv.clone(), settings.highlight.style.clone()))
        }
        _ => Box::new(PlainHighlighter::new(settings.highlight.style.clone())),
    }
}

/// Fingerprint of the whole highlighting configuration.
pub fn highlight_fingerprint(settings: &Settings, highlighter: &dyn Highlighter) -> String {
    json_hash(&(
        highlighter.fingerprint(),
        &settings.highlight.lexers,
        settings.highlight.enabled,
    ))
}

/// Configured lexer for `family`, falling back to the engine's language.
pub fn resolve_lexer(settings: &Settings, family: &str, language: &str) -> String {
    settings.highlight.lexers.get(family).cloned().unwrap_or_else(|| language.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightSource {
    Code(String),
    /// `EXT:` session: the displayed code lives in this file.
    External(PathBuf),
    /// Console transcript reused from the session's typeset cache.
    Transcript(String),
}

#[derive(Debug, Clone)]
pub struct HighlightRequest {
    pub key_typeset: String,
    pub lexer: String,
    pub source: HighlightSource,
}

#[derive(Debug, Default)]
pub struct HighlightOutcome {
    pub entries: BTreeMap<String, HighlightEntry>,
    pub status: ExitStatus,
    pub messages: Vec<String>,
}

/// Store highlighted text inline, or in its own file past the threshold.
pub fn render_entry(key_typeset: &str, text: String, settings: &Settings) -> Result<HighlightEntry> {
    match settings.fvextfile {
        Some(limit) if text.lines().count() > limit => {
            std::fs::create_dir_all(&settings.output_dir)?;
            let path = settings.output_dir.join(format!("{}.hl", file_stem_for_key(key_typeset)));
            write_text_file(&path, &text, &settings.encoding)?;
            Ok(HighlightEntry::File(path))
        }
        _ => Ok(HighlightEntry::Inline(text)),
    }
}

/// Body of the shared highlighting unit.
///
/// Each request is independent: one failure is counted and reported without
/// stopping the rest.
pub fn highlight_all(
    requests: &[HighlightRequest],
    highlighter: &dyn Highlighter,
    settings: &Settings,
) -> HighlightOutcome {
    let mut outcome = HighlightOutcome::default();
    for request in requests {
        let result = source_text(request, settings)
            .and_then(|code| highlighter.highlight(&code, &request.lexer))
            .and_then(|text| render_entry(&request.key_typeset, text, settings));
        match result {
            Ok(entry) => {
                outcome.entries.insert(request.key_typeset.clone(), entry);
            }
            Err(err) => {
                outcome.status.errors += 1;
                outcome.messages.push(format!("{}: highlighting failed: {err:#}", request.key_typeset));
            }
        }
    }
    tracing::debug!("Highlighted {} of {} entries", outcome.entries.len(), requests.len());
    outcome
}

fn source_text(request: &HighlightRequest, settings: &Settings) -> Result<String> {
    match &request.source {
        HighlightSource::Code(code) | HighlightSource::Transcript(code) => Ok(code.clone()),
        HighlightSource::External(path) => read_text_file(path, &settings.encoding),
    }
}
