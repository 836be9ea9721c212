//! Per-family script templates.

use serde::{Deserialize, Serialize};

/// Marker printed before each block's output.
pub const INSTANCE_DELIM_PREFIX: &str = "=>TEXRUN:INSTANCE#";
/// Marker printed once all blocks have run.
pub const END_DELIM: &str = "=>TEXRUN:END#";
pub const DEPENDENCY_PREFIX: &str = "=>TEXRUN:DEPENDENCY#";
pub const CREATED_PREFIX: &str = "=>TEXRUN:CREATED#";

/// How one family's code is wrapped, run and diagnosed.
///
/// Any change to a template changes the engine hash of its family and forces
/// every session of that family to rerun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTemplate {
    /// Lexer used when this family's code is highlighted.
    pub language: String,
    pub extension: String,
    /// Interpreter argv; `{file}` is replaced by the script path.
    pub command: Vec<String>,
    pub header: String,
    pub footer: String,
    /// Statement that prints `{delim}` on its own stdout line.
    pub delimiter: String,
    /// Wrapper for inline expressions; `{code}` is replaced by the expression.
    pub inline: String,
    pub error_patterns: Vec<String>,
    pub warning_patterns: Vec<String>,
    /// Regex whose first group captures a script line number in stderr.
    pub line_pattern: String,
    pub console: bool,
    pub prompt: String,
    pub continuation: String,
}

impl Default for EngineTemplate {
    fn default() -> Self {
        Self {
            language: "text".to_string(),
            extension: "txt".to_string(),
            command: Vec::new(),
            header: String::new(),
            footer: String::new(),
            delimiter: "echo '{delim}'".to_string(),
            inline: "{code}".to_string(),
            error_patterns: vec!["error".to_string(), "Error".to_string()],
            warning_patterns: vec!["warning".to_string(), "Warning".to_string()],
            line_pattern: r"line (\d+)".to_string(),
            console: false,
            prompt: "$ ".to_string(),
            continuation: "> ".to_string(),
        }
    }
}

const PYTHON_HEADER: &str = "\
import sys
def texrun_add_dependencies(*paths):
    for p in paths:
        print('=>TEXRUN:DEPENDENCY#' + str(p))
def texrun_add_created(*paths):
    for p in paths:
        print('=>TEXRUN:CREATED#' + str(p))
";

const RUBY_HEADER: &str = "\
$stdout.sync = true
def texrun_add_dependencies(*paths)
  paths.each { |p| puts \"=>TEXRUN:DEPENDENCY##{p}\" }
end
def texrun_add_created(*paths)
  paths.each { |p| puts \"=>TEXRUN:CREATED##{p}\" }
end
";

const SH_HEADER: &str = "\
texrun_add_dependencies() { for p in \"$@\"; do echo \"=>TEXRUN:DEPENDENCY#$p\"; done; }
texrun_add_created() { for p in \"$@\"; do echo \"=>TEXRUN:CREATED#$p\"; done; }
";

fn python(console: bool) -> EngineTemplate {
    EngineTemplate {
        language: if console { "pycon".to_string() } else { "python".to_string() },
        extension: "py".to_string(),
        command: vec!["python3".to_string(), "-u".to_string(), "{file}".to_string()],
        header: PYTHON_HEADER.to_string(),
        delimiter: "print('{delim}', flush=True)".to_string(),
        inline: "print({code})".to_string(),
        error_patterns: vec!["Error".to_string()],
        warning_patterns: vec!["Warning".to_string()],
        line_pattern: r"line (\d+)".to_string(),
        console,
        prompt: ">>> ".to_string(),
        continuation: "... ".to_string(),
        ..EngineTemplate::default()
    }
}

fn ruby() -> EngineTemplate {
    EngineTemplate {
        language: "ruby".to_string(),
        extension: "rb".to_string(),
        command: vec!["ruby".to_string(), "{file}".to_string()],
        header: RUBY_HEADER.to_string(),
        delimiter: "puts '{delim}'".to_string(),
        inline: "puts({code})".to_string(),
        error_patterns: vec!["Error".to_string(), "error".to_string()],
        warning_patterns: vec!["warning".to_string()],
        line_pattern: r":(\d+):".to_string(),
        ..EngineTemplate::default()
    }
}

fn shell(program: &str, language: &str) -> EngineTemplate {
    EngineTemplate {
        language: language.to_string(),
        extension: "sh".to_string(),
        command: vec![program.to_string(), "{file}".to_string()],
        header: SH_HEADER.to_string(),
        delimiter: "echo '{delim}'".to_string(),
        inline: "echo {code}".to_string(),
        error_patterns: vec!["error".to_string(), "Error".to_string()],
        warning_patterns: vec!["warning".to_string(), "Warning".to_string()],
        line_pattern: r": (?:line )?(\d+): ".to_string(),
        ..EngineTemplate::default()
    }
}

/// Templates available without any configuration.
pub fn builtin_templates() -> Vec<(&'static str, EngineTemplate)> {
    vec![
        ("python", python(false)),
        ("pycon", python(true)),
        ("ruby", ruby()),
        ("sh", shell("sh", "sh")),
        ("bash", shell("bash", "bash")),
    ]
}
