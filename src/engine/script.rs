//! Script assembly and the script-line to document-line index.

use super::template::{EngineTemplate, END_DELIM, INSTANCE_DELIM_PREFIX};
use crate::domain::{CodeBlock, CommandKind, GobbleMode};

/// Custom code of one family, already in document order.
#[derive(Debug, Clone, Default)]
pub struct CustomCode {
    pub begin: Vec<CodeBlock>,
    pub end: Vec<CodeBlock>,
}

/// Origin of a run of script lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub script_start: usize,
    pub line_count: usize,
    pub instance: Option<u64>,
    pub document_line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineIndex {
    spans: Vec<LineSpan>,
}

impl LineIndex {
    /// Map a 1-based script line back to `(instance, document line)`.
    pub fn lookup(&self, script_line: usize) -> Option<(Option<u64>, usize)> {
        self.spans.iter().find_map(|span| {
            let end = span.script_start + span.line_count;
            (script_line >= span.script_start && script_line < end)
                .then(|| (span.instance, span.document_line + (script_line - span.script_start)))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Script {
    pub text: String,
    pub extension: String,
    pub line_index: LineIndex,
}

pub fn instance_delimiter(instance: u64, command: &str) -> String {
    format!("{INSTANCE_DELIM_PREFIX}{instance}#{command}#")
}

struct ScriptWriter {
    text: String,
    next_line: usize,
    index: LineIndex,
}

impl ScriptWriter {
    fn new() -> Self {
        Self { text: String::new(), next_line: 1, index: LineIndex::default() }
    }

    fn push_unmapped(&mut self, chunk: &str) {
        for line in chunk.lines() {
            self.push_line(line);
        }
    }

    fn push_mapped(&mut self, code: &str, instance: Option<u64>, document_line: usize) {
        let start = self.next_line;
        let mut count = 0;
        for line in code.lines() {
            self.push_line(line);
            count += 1;
        }
        if count > 0 {
            self.index.spans.push(LineSpan {
                script_start: start,
                line_count: count,
                instance,
                document_line,
            });
        }
    }

    fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
        self.next_line += 1;
    }
}

/// Wrap a session's blocks in its family template.
///
/// Blocks run in the order given; each is preceded by a delimiter statement
/// so captured stdout can be split back into per-instance output.
pub fn assemble(
    template: &EngineTemplate,
    blocks: &[CodeBlock],
    custom: &CustomCode,
    gobble: GobbleMode,
) -> Script {
    let mut writer = ScriptWriter::new();
    writer.push_unmapped(&template.header);

    for cc in &custom.begin {
        writer.push_mapped(&cc.gobbled_code(gobble), None, cc.line);
    }

    for block in blocks {
        let instance = block.instance_index().unwrap_or_default();
        writer.push_unmapped(
            &template.delimiter.replace("{delim}", &instance_delimiter(instance, &block.command)),
        );
        let code = block.gobbled_code(gobble);
        let code = if block.kind() == Some(CommandKind::Inline) {
            template.inline.replace("{code}", code.trim())
        } else {
            code.into_owned()
        };
        writer.push_mapped(&code, Some(instance), block.line);
    }

    writer.push_unmapped(&template.delimiter.replace("{delim}", END_DELIM));

    for cc in &custom.end {
        writer.push_mapped(&cc.gobbled_code(gobble), None, cc.line);
    }

    writer.push_unmapped(&template.footer);

    Script { text: writer.text, extension: template.extension.clone(), line_index: writer.index }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::block::block;
    use crate::engine::template::builtin_templates;

    fn sh() -> EngineTemplate {
        builtin_templates().into_iter().find(|(f, _)| *f == "sh").map(|(_, t)| t).expect("sh")
    }

    #[test]
    fn blocks_are_delimited_in_order() {
        let blocks = vec![block("sh", "main", 0, "code", "echo a"), block("sh", "main", 1, "code", "echo b")];
        let script = assemble(&sh(), &blocks, &CustomCode::default(), GobbleMode::None);
        let first = script.text.find("=>TEXRUN:INSTANCE#0#code#").expect("first delim");
        let second = script.text.find("=>TEXRUN:INSTANCE#1#code#").expect("second delim");
        let end = script.text.find(END_DELIM).expect("end delim");
        assert!(first < second && second < end);
        assert_eq!(script.extension, "sh");
    }

    #[test]
    fn line_index_maps_back_to_document_lines() {
        let mut b = block("sh", "main", 4, "code", "echo a\necho b\n");
        b.line = 20;
        let script = assemble(&sh(), &[b], &CustomCode::default(), GobbleMode::None);
        let header_lines = sh().header.lines().count();
        // header, then the delimiter, then two code lines
        let first_code_line = header_lines + 2;
        assert_eq!(script.line_index.lookup(first_code_line), Some((Some(4), 20)));
        assert_eq!(script.line_index.lookup(first_code_line + 1), Some((Some(4), 21)));
        assert_eq!(script.line_index.lookup(1), None);
    }

    #[test]
    fn inline_commands_use_the_inline_wrapper() {
        let blocks = vec![block("sh", "main", 0, "i", " $((1+2)) ")];
        let script = assemble(&sh(), &blocks, &CustomCode::default(), GobbleMode::None);
        assert!(script.text.contains("echo $((1+2))\n"));
    }

    #[test]
    fn custom_code_wraps_session_code() {
        let custom = CustomCode {
            begin: vec![block("CC:sh:begin", "main", 0, "code", "X=1")],
            end: vec![block("CC:sh:end", "main", 0, "code", "echo done")],
        };
        let blocks = vec![block("sh", "main", 0, "code", "echo $X")];
        let script = assemble(&sh(), &blocks, &custom, GobbleMode::None);
        let begin = script.text.find("X=1").expect("begin");
        let body = script.text.find("echo $X").expect("body");
        let end = script.text.find("echo done").expect("end");
        assert!(begin < body && body < end);
    }
}
