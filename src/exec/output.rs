//! Splitting captured stdout back into per-instance output.

use crate::engine::template::{CREATED_PREFIX, DEPENDENCY_PREFIX, END_DELIM};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static INSTANCE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^=>TEXRUN:INSTANCE#(\d+)#([^#]*)#\s*$").expect("valid instance delimiter regex")
});

#[derive(Debug, Default, PartialEq)]
pub struct ParsedOutput {
    /// Output printed by each instance, in the order the delimiters appeared.
    pub instances: BTreeMap<u64, String>,
    pub dependencies: Vec<String>,
    pub created: Vec<String>,
    /// Whether the script reached its end delimiter.
    pub completed: bool,
}

/// Parse stdout produced by an assembled script.
///
/// Output before the first delimiter belongs to the header and custom code
/// and is dropped, as is output after the end delimiter. Protocol lines are
/// honoured wherever they appear and never reach instance output.
pub fn parse_stdout(stdout: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();
    let mut current: Option<u64> = None;

    for raw in stdout.lines() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(path) = line.strip_prefix(DEPENDENCY_PREFIX) {
            push_path(&mut parsed.dependencies, path);
            continue;
        }
        if let Some(path) = line.strip_prefix(CREATED_PREFIX) {
            push_path(&mut parsed.created, path);
            continue;
        }
        if line.trim_end() == END_DELIM {
            parsed.completed = true;
            current = None;
            continue;
        }
        if let Some(caps) = INSTANCE_LINE.captures(line) {
            // an index too large for u64 cannot come from an assembled script
            current = caps[1].parse().ok();
            if let Some(instance) = current {
                parsed.instances.entry(instance).or_default();
            }
            continue;
        }
        if let Some(instance) = current {
            let out = parsed.instances.entry(instance).or_default();
            out.push_str(line);
            out.push('\n');
        }
    }
    parsed
}

fn push_path(paths: &mut Vec<String>, raw: &str) {
    let path = raw.trim();
    if !path.is_empty() && !paths.iter().any(|p| p == path) {
        paths.push(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_split_by_instance() {
        let stdout = "header noise\n\
            =>TEXRUN:INSTANCE#0#code#\n\
            a\n\
            =>TEXRUN:INSTANCE#1#i#\n\
            3\n\
            =>TEXRUN:END#\n\
            trailing\n";
        let parsed = parse_stdout(stdout);
        assert_eq!(parsed.instances[&0], "a\n");
        assert_eq!(parsed.instances[&1], "3\n");
        assert!(parsed.completed);
    }

    #[test]
    fn silent_instances_are_still_recorded() {
        let parsed = parse_stdout("=>TEXRUN:INSTANCE#2#code#\n=>TEXRUN:END#\n");
        assert_eq!(parsed.instances.get(&2).map(String::as_str), Some(""));
    }

    #[test]
    fn protocol_lines_are_collected_and_hidden() {
        let stdout = "=>TEXRUN:INSTANCE#0#code#\n\
            =>TEXRUN:DEPENDENCY#data.csv\n\
            value\n\
            =>TEXRUN:CREATED#plot.pdf\n\
            =>TEXRUN:DEPENDENCY#data.csv\n";
        let parsed = parse_stdout(stdout);
        assert_eq!(parsed.instances[&0], "value\n");
        assert_eq!(parsed.dependencies, vec!["data.csv".to_string()]);
        assert_eq!(parsed.created, vec!["plot.pdf".to_string()]);
        assert!(!parsed.completed);
    }
}
