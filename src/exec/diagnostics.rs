//! Error and warning accounting for one session's stderr.

use crate::domain::ExitStatus;
use crate::engine::{EngineTemplate, LineIndex};
use regex::Regex;

#[derive(Debug, Default)]
pub struct Diagnostics {
    pub status: ExitStatus,
    pub messages: Vec<String>,
}

/// Classify stderr lines and translate script line numbers.
///
/// A non-zero exit with no matched error still counts one error, and stderr
/// output with no matched pattern counts one warning, so a failing session is
/// never reported clean.
pub fn classify(
    key_run: &str,
    stderr: &str,
    exit_ok: bool,
    template: &EngineTemplate,
    line_index: &LineIndex,
) -> Diagnostics {
    let line_pattern = match Regex::new(&template.line_pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!("{}: invalid line pattern '{}': {}", key_run, template.line_pattern, err);
            None
        }
    };

    let mut diagnostics = Diagnostics::default();
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        if template.error_patterns.iter().any(|p| line.contains(p.as_str())) {
            diagnostics.status.errors += 1;
        } else if template.warning_patterns.iter().any(|p| line.contains(p.as_str())) {
            diagnostics.status.warnings += 1;
        }
        let origin = line_pattern
            .as_ref()
            .and_then(|re| translate_line(re, line, line_index))
            .unwrap_or_default();
        diagnostics.messages.push(format!("{key_run}: {}{origin}", line.trim_end()));
    }

    let has_stderr = !stderr.trim().is_empty();
    if !exit_ok && diagnostics.status.errors == 0 {
        diagnostics.status.errors += 1;
        diagnostics.messages.push(format!("{key_run}: unknown error (non-zero exit)"));
    } else if exit_ok && has_stderr && diagnostics.status.is_clean() {
        diagnostics.status.warnings += 1;
    }
    diagnostics
}

fn translate_line(re: &Regex, line: &str, index: &LineIndex) -> Option<String> {
    let script_line: usize = re.captures(line)?.get(1)?.as_str().parse().ok()?;
    let (instance, document_line) = index.lookup(script_line)?;
    Some(match instance {
        Some(instance) => format!(" [document line {document_line}, instance {instance}]"),
        None => format!(" [document line {document_line}, custom code]"),
    })
}
