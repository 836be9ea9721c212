//! Execution units: one per rerun session, plus one shared highlighting unit.

use super::diagnostics::classify;
use super::output::parse_stdout;
use super::process::run_process;
use crate::deps::record_tokens;
use crate::domain::{CodeBlock, ExitStatus, HighlightEntry, SessionRecord, Settings};
use crate::engine::{CustomCode, EngineProvider, EngineTemplate};
use crate::error::EngineError;
use crate::fingerprint::SessionPlan;
use crate::highlight::{
    highlight_all, render_entry, resolve_lexer, HighlightOutcome, HighlightRequest, Highlighter,
};
use crate::reap::reap;
use crate::utils::{decode_bytes, file_stem_for_key, resolve_in, write_text_file};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Read-only services shared by every unit of a build.
pub struct UnitContext<'a> {
    pub settings: &'a Settings,
    pub engines: &'a dyn EngineProvider,
    pub highlighter: &'a dyn Highlighter,
    pub custom_code: &'a BTreeMap<String, CustomCode>,
}

#[derive(Debug, Clone)]
pub struct SessionJob {
    pub plan: SessionPlan,
}

#[derive(Debug, Clone)]
pub struct HighlightJob {
    pub requests: Vec<HighlightRequest>,
}

#[derive(Debug, Clone)]
pub enum ExecutionUnit {
    Session(SessionJob),
    Highlight(HighlightJob),
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub key_run: String,
    pub record: SessionRecord,
    pub messages: Vec<String>,
}

#[derive(Debug)]
pub struct ConsoleOutcome {
    pub session: SessionOutcome,
    /// Highlighted transcripts keyed by `key_typeset`.
    pub highlights: BTreeMap<String, HighlightEntry>,
}

#[derive(Debug)]
pub enum ExecutionResult {
    Code(SessionOutcome),
    Console(ConsoleOutcome),
    Highlight(HighlightOutcome),
}

impl ExecutionResult {
    pub fn status(&self) -> ExitStatus {
        match self {
            Self::Code(outcome) => outcome.record.exit_status_or_clean(),
            Self::Console(outcome) => outcome.session.record.exit_status_or_clean(),
            Self::Highlight(outcome) => outcome.status,
        }
    }

    pub fn messages(&self) -> &[String] {
        match self {
            Self::Code(outcome) => &outcome.messages,
            Self::Console(outcome) => &outcome.session.messages,
            Self::Highlight(outcome) => &outcome.messages,
        }
    }
}

impl ExecutionUnit {
    pub fn label(&self) -> &str {
        match self {
            Self::Session(job) => &job.plan.key_run,
            Self::Highlight(_) => "highlighting",
        }
    }

    pub fn execute(self, ctx: &UnitContext<'_>) -> ExecutionResult {
        match self {
            Self::Session(job) => {
                let mut highlights = BTreeMap::new();
                let outcome = run_session(&job.plan, ctx, &mut highlights);
                if job.plan.console {
                    ExecutionResult::Console(ConsoleOutcome { session: outcome, highlights })
                } else {
                    ExecutionResult::Code(outcome)
                }
            }
            Self::Highlight(job) => {
                ExecutionResult::Highlight(highlight_all(&job.requests, ctx.highlighter, ctx.settings))
            }
        }
    }
}

/// `<outdir>/<key_typeset>.stdout` for environment forms.
pub fn stdout_path(settings: &Settings, key_typeset: &str) -> PathBuf {
    settings.output_dir.join(format!("{}.stdout", file_stem_for_key(key_typeset)))
}

pub fn macro_fragment(key_typeset: &str, output: &str) -> String {
    format!("\\texrunmacro{{{key_typeset}}}{{{}}}", output.trim_end_matches(['\n', '\r']))
}

/// Prompted code followed by its output, as an interactive session shows it.
pub fn console_transcript(template: &EngineTemplate, code: &str, output: &str) -> String {
    let mut transcript = String::new();
    for (idx, line) in code.lines().enumerate() {
        let continued = idx > 0 && (line.is_empty() || line.starts_with(char::is_whitespace));
        transcript.push_str(if continued { &template.continuation } else { &template.prompt });
        transcript.push_str(line);
        transcript.push('\n');
    }
    transcript.push_str(output);
    transcript
}

struct SessionRun<'p> {
    plan: &'p SessionPlan,
    record: SessionRecord,
    status: ExitStatus,
    messages: Vec<String>,
}

impl<'p> SessionRun<'p> {
    fn new(plan: &'p SessionPlan) -> Self {
        Self {
            plan,
            record: SessionRecord::new(plan.fingerprint.clone()),
            status: ExitStatus::default(),
            messages: Vec::new(),
        }
    }

    fn error(&mut self, err: EngineError) {
        self.status.errors += 1;
        self.messages.push(err.to_string());
    }

    fn warning(&mut self, message: String) {
        self.status.warnings += 1;
        self.messages.push(message);
    }

    fn failure(&mut self, message: impl Into<String>) {
        self.error(EngineError::ExecutionFailure {
            session: self.plan.key_run.clone(),
            message: message.into(),
        });
    }

    fn finish(mut self) -> SessionOutcome {
        self.record.exit_status = Some(self.status);
        SessionOutcome { key_run: self.plan.key_run.clone(), record: self.record, messages: self.messages }
    }
}

fn run_session(
    plan: &SessionPlan,
    ctx: &UnitContext<'_>,
    highlights: &mut BTreeMap<String, HighlightEntry>,
) -> SessionOutcome {
    let settings = ctx.settings;
    let mut run = SessionRun::new(plan);
    let started = Instant::now();

    let template = match ctx.engines.template(&plan.family) {
        Ok(template) => template,
        Err(err) => {
            run.error(err);
            return run.finish();
        }
    };
    let no_custom = CustomCode::default();
    let custom = ctx.custom_code.get(&plan.family).unwrap_or(&no_custom);
    let script = match ctx.engines.assemble(&plan.family, &plan.blocks, custom, settings.gobble) {
        Ok(script) => script,
        Err(err) => {
            run.error(err);
            return run.finish();
        }
    };

    let script_path = settings
        .output_dir
        .join(format!("{}.{}", file_stem_for_key(&plan.key_run), script.extension));
    let own_files: Vec<PathBuf> = std::iter::once(script_path.clone())
        .chain(plan.blocks.iter().map(|block| stdout_path(settings, &block.key_typeset())))
        .collect();
    for failure in reap(&own_files).failures {
        run.warning(format!("{}: {failure}", plan.key_run));
    }

    if let Err(err) = std::fs::create_dir_all(&settings.output_dir) {
        run.error(EngineError::io(&settings.output_dir, err));
        return run.finish();
    }
    if let Err(err) = write_text_file(&script_path, &script.text, &settings.encoding) {
        run.failure(format!("{err:#}"));
        return run.finish();
    }
    run.record.files.push(script_path.clone());

    let script_arg = std::fs::canonicalize(&script_path).unwrap_or_else(|_| script_path.clone());
    let script_arg = script_arg.to_string_lossy();
    let argv: Vec<String> =
        template.command.iter().map(|arg| arg.replace("{file}", &script_arg)).collect();
    let timeout = settings.timeout_secs.map(Duration::from_secs);

    let output = match run_process(&argv, &settings.working_dir, timeout) {
        Ok(output) => output,
        Err(err) => {
            run.failure(format!("{err:#}"));
            return run.finish();
        }
    };
    if output.timed_out {
        run.failure(format!("timed out after {}s", settings.timeout_secs.unwrap_or_default()));
    }

    let stdout = decode_bytes(&output.stdout, &settings.encoding);
    let stderr = decode_bytes(&output.stderr, &settings.encoding);
    let parsed = parse_stdout(&stdout);

    let diagnostics = classify(
        &plan.key_run,
        &stderr,
        output.success() || output.timed_out,
        template,
        &script.line_index,
    );
    run.status.errors += diagnostics.status.errors;
    run.status.warnings += diagnostics.status.warnings;
    run.messages.extend(diagnostics.messages);

    if output.success() && !parsed.completed {
        run.warning(format!("{}: script exited before its last block", plan.key_run));
    }

    for block in &plan.blocks {
        let instance = block.instance_index().unwrap_or_default();
        let printed = parsed.instances.get(&instance).map(String::as_str);
        if block.is_cons() || template.console {
            record_transcript(&mut run, ctx, template, block, instance, printed.unwrap_or(""), highlights);
        } else if let Some(text) = printed {
            record_output(&mut run, settings, block, text);
        }
    }

    for created in &parsed.created {
        run.record.files.push(resolve_in(&settings.working_dir, created));
    }

    let (tokens, missing) = record_tokens(
        &plan.key_run,
        &parsed.dependencies,
        settings.dependency_mode(),
        &settings.working_dir,
    );
    run.record.dependencies = tokens;
    for err in missing {
        run.error(err);
    }

    tracing::debug!(
        "{} finished in {:?} ({} errors, {} warnings)",
        plan.key_run,
        started.elapsed(),
        run.status.errors,
        run.status.warnings
    );
    run.finish()
}

fn record_output(run: &mut SessionRun<'_>, settings: &Settings, block: &CodeBlock, text: &str) {
    let key_typeset = block.key_typeset();
    if block.is_macro_output() {
        run.record.macros.push(macro_fragment(&key_typeset, text));
        return;
    }
    if text.is_empty() {
        return;
    }
    let path = stdout_path(settings, &key_typeset);
    match write_text_file(&path, text, &settings.encoding) {
        Ok(()) => run.record.files.push(path),
        Err(err) => run.failure(format!("{err:#}")),
    }
}

fn record_transcript(
    run: &mut SessionRun<'_>,
    ctx: &UnitContext<'_>,
    template: &EngineTemplate,
    block: &CodeBlock,
    instance: u64,
    printed: &str,
    highlights: &mut BTreeMap<String, HighlightEntry>,
) {
    let settings = ctx.settings;
    let transcript = console_transcript(template, &block.gobbled_code(settings.gobble), printed);
    run.record.typeset_cache.insert(instance, transcript.clone());
    if !settings.highlight.enabled {
        return;
    }

    let key_typeset = block.key_typeset();
    let lexer = resolve_lexer(settings, &block.family, &template.language);
    let entry = ctx
        .highlighter
        .highlight(&transcript, &lexer)
        .and_then(|text| render_entry(&key_typeset, text, settings));
    match entry {
        Ok(entry) => {
            if let Some(path) = entry.file() {
                run.record.files.push(path.clone());
            }
            highlights.insert(key_typeset, entry);
        }
        Err(err) => run.failure(format!("highlighting {key_typeset} failed: {err:#}")),
    }
}
