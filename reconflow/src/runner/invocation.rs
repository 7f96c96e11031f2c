//! A fully resolved tool invocation.

use crate::config::{InputMode, OutputMode, ToolSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Values substituted into argument templates.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: Vec<(&'static str, String)>,
}

impl Placeholders {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `{name}` to a string.
    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.push((name, value.into()));
        self
    }

    /// Binds `{name}` to a path.
    #[must_use]
    pub fn with_path(self, name: &'static str, path: &Path) -> Self {
        self.with(name, path.display().to_string())
    }

    /// Substitutes every bound placeholder in `template`.
    #[must_use]
    pub fn render(&self, template: &str) -> String {
        let mut out = template.to_string();
        for (name, value) in &self.values {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }
}

/// One tool run: program, rendered arguments and file wiring.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Stage the run belongs to.
    pub stage: String,
    /// Tool name.
    pub tool: String,
    /// Executable.
    pub program: String,
    /// Rendered arguments.
    pub args: Vec<String>,
    /// File piped to stdin, if any.
    pub stdin: Option<PathBuf>,
    /// Output contract.
    pub output_mode: OutputMode,
    /// Artifact file (stdout/file contracts) or directory.
    pub output: PathBuf,
    /// Where stderr is captured.
    pub stderr: PathBuf,
    /// Wall-clock budget.
    pub timeout: Duration,
}

impl ToolInvocation {
    /// Resolves a tool spec for one run.
    ///
    /// `{output}` and `{output_dir}` are bound here; the caller supplies the
    /// rest. `input` is piped to stdin when the spec asks for it.
    #[must_use]
    pub fn from_spec(
        stage: impl Into<String>,
        spec: &ToolSpec,
        placeholders: &Placeholders,
        input: Option<&Path>,
        output: PathBuf,
        stderr: PathBuf,
    ) -> Self {
        let bound = placeholders
            .clone()
            .with_path("output", &output)
            .with_path("output_dir", &output);
        Self {
            stage: stage.into(),
            tool: spec.name.clone(),
            program: spec.program().to_string(),
            args: spec.args.iter().map(|a| bound.render(a)).collect(),
            stdin: match spec.input {
                InputMode::Stdin => input.map(Path::to_path_buf),
                InputMode::Args => None,
            },
            output_mode: spec.output,
            output,
            stderr,
            timeout: spec.timeout(),
        }
    }

    /// Short label for logs: `stage/tool`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.stage, self.tool)
    }

    /// The command line, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
