//! Configuration for a reconflow run.
//!
//! Everything is loaded from one JSON document. Every field has a default,
//! so an empty object (or no file at all) yields the built-in tool chain.

use crate::errors::{ReconflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`ReconConfig::session_root`].
pub const SESSION_ROOT_ENV: &str = "RECONFLOW_SESSION_ROOT";

/// How a tool receives its input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Input is only referenced through `{input}` / `{target}` placeholders.
    #[default]
    Args,
    /// The stage input file is piped to stdin.
    Stdin,
}

/// Where a tool leaves its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Stdout is captured into the tool's artifact file.
    #[default]
    Stdout,
    /// The tool writes the file passed as `{output}` itself.
    File,
    /// The tool fills the directory passed as `{output_dir}`.
    Directory,
}

/// One external tool in a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name used for artifact files and logs.
    pub name: String,
    /// Executable; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Argument templates. Placeholders: `{target}`, `{input}`, `{params}`,
    /// `{output}`, `{output_dir}`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Input delivery.
    #[serde(default)]
    pub input: InputMode,
    /// Output contract.
    #[serde(default)]
    pub output: OutputMode,
    /// Wall-clock budget in seconds.
    #[serde(default = "default_tool_timeout")]
    pub timeout_seconds: u64,
    /// Whether a missing binary is fatal at preflight.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_tool_timeout() -> u64 {
    300
}

fn default_required() -> bool {
    true
}

impl ToolSpec {
    /// Creates a required, stdout-capturing tool with the default timeout.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: None,
            args: Vec::new(),
            input: InputMode::default(),
            output: OutputMode::default(),
            timeout_seconds: default_tool_timeout(),
            required: default_required(),
        }
    }

    /// Sets the executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Sets the argument templates.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the input mode.
    #[must_use]
    pub const fn with_input(mut self, input: InputMode) -> Self {
        self.input = input;
        self
    }

    /// Sets the output contract.
    #[must_use]
    pub const fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Marks the tool optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// The executable to spawn.
    #[must_use]
    pub fn program(&self) -> &str {
        self.program.as_deref().unwrap_or(&self.name)
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Returns true if the tool consumes the parametrized URL list.
    #[must_use]
    pub fn uses_params(&self) -> bool {
        self.args.iter().any(|arg| arg.contains("{params}"))
    }
}

/// Ordered tool lists, one per tool-running stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTools {
    /// Subdomain discovery.
    #[serde(default = "default_recon_tools")]
    pub recon: Vec<ToolSpec>,
    /// Liveness probing.
    #[serde(default = "default_alive_tools")]
    pub alive: Vec<ToolSpec>,
    /// URL collection.
    #[serde(default = "default_crawl_tools")]
    pub crawl: Vec<ToolSpec>,
    /// Vulnerability scanners. Names `nuclei`, `dalfox` and `sqlmap` are
    /// counted as template, XSS and injection findings respectively.
    #[serde(default = "default_vulnscan_tools")]
    pub vulnscan: Vec<ToolSpec>,
}

fn default_recon_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("subfinder").with_args(["-d", "{target}", "-silent"]),
        ToolSpec::new("assetfinder")
            .with_args(["-subs-only", "{target}"])
            .optional(),
        ToolSpec::new("amass")
            .with_args(["enum", "-passive", "-d", "{target}"])
            .with_timeout_seconds(600)
            .optional(),
    ]
}

fn default_alive_tools() -> Vec<ToolSpec> {
    vec![ToolSpec::new("httpx")
        .with_args(["-l", "{input}", "-silent"])
        .with_timeout_seconds(600)]
}

fn default_crawl_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("katana")
            .with_args(["-list", "{input}", "-silent"])
            .with_timeout_seconds(900)
            .optional(),
        ToolSpec::new("gau").with_input(InputMode::Stdin),
        ToolSpec::new("waybackurls").with_input(InputMode::Stdin),
    ]
}

fn default_vulnscan_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("nuclei")
            .with_args(["-l", "{input}", "-silent", "-o", "{output}"])
            .with_output(OutputMode::File)
            .with_timeout_seconds(1800),
        ToolSpec::new("dalfox")
            .with_args(["file", "{params}", "--silence", "-o", "{output}"])
            .with_output(OutputMode::File)
            .with_timeout_seconds(1200),
        ToolSpec::new("sqlmap")
            .with_args(["-m", "{params}", "--batch", "--output-dir", "{output_dir}"])
            .with_output(OutputMode::Directory)
            .with_timeout_seconds(1800),
    ]
}

impl Default for StageTools {
    fn default() -> Self {
        Self {
            recon: default_recon_tools(),
            alive: default_alive_tools(),
            crawl: default_crawl_tools(),
            vulnscan: default_vulnscan_tools(),
        }
    }
}

impl StageTools {
    /// Iterates over every configured tool.
    pub fn all(&self) -> impl Iterator<Item = &ToolSpec> {
        self.recon
            .iter()
            .chain(&self.alive)
            .chain(&self.crawl)
            .chain(&self.vulnscan)
    }
}

/// What to do when a session directory name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIdPolicy {
    /// Append `-2`, `-3`, ... until the name is free.
    #[default]
    Suffix,
    /// Refuse to create the session.
    Fail,
}

/// Report rendering limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Maximum raw excerpts rendered per category.
    #[serde(default = "default_max_excerpts")]
    pub max_excerpts_per_tool: usize,
}

fn default_max_excerpts() -> usize {
    5
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_excerpts_per_tool: default_max_excerpts(),
        }
    }
}

/// External notification transport.
///
/// A command receives the notification through `{audience}`, `{subject}`,
/// `{target}`, `{vuln_count}`, `{report}` and `{session}` placeholders.
/// Leaving a command unset means the sink is not configured for that
/// audience and every message falls back to a local copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Command for the operator alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_command: Option<ToolSpec>,
    /// Command for the remediation notice sent after approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_command: Option<ToolSpec>,
}

/// Decision channel used by the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalChannelKind {
    /// Interactive prompt on the controlling terminal.
    #[default]
    Terminal,
    /// Poll `approval/decision` inside the session directory.
    File,
}

/// Approval workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Decision channel.
    #[serde(default)]
    pub channel: ApprovalChannelKind,
    /// Withdraw the request after this many idle seconds. `None` waits forever.
    #[serde(default)]
    pub idle_timeout_seconds: Option<u64>,
    /// Poll interval of the file channel.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            channel: ApprovalChannelKind::default(),
            idle_timeout_seconds: None,
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl ApprovalConfig {
    /// Idle timeout as Duration.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }

    /// Poll interval as Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconConfig {
    /// Directory holding all session directories and pointer files.
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,
    /// Session directory collision policy.
    #[serde(default)]
    pub session_id_policy: SessionIdPolicy,
    /// Tool chain per stage.
    #[serde(default)]
    pub tools: StageTools,
    /// Optional analysis collaborator run over the consolidated findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<ToolSpec>,
    /// Cap on parametrized URLs handed to injection scanners.
    #[serde(default = "default_max_parametrized")]
    pub max_parametrized_urls: usize,
    /// Report limits.
    #[serde(default)]
    pub report: ReportConfig,
    /// Notification transport.
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Approval workflow.
    #[serde(default)]
    pub approval: ApprovalConfig,
}

fn default_session_root() -> PathBuf {
    PathBuf::from("./results")
}

fn default_max_parametrized() -> usize {
    50
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            session_root: default_session_root(),
            session_id_policy: SessionIdPolicy::default(),
            tools: StageTools::default(),
            analyzer: None,
            max_parametrized_urls: default_max_parametrized(),
            report: ReportConfig::default(),
            notification: NotificationConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

impl ReconConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReconflowError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Parses a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ReconflowError::config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, the defaults otherwise, then applies the
    /// environment override.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Ok(root) = std::env::var(SESSION_ROOT_ENV) {
            if !root.trim().is_empty() {
                config.session_root = PathBuf::from(root);
            }
        }
        Ok(config)
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for tool in self.tools.all().chain(self.analyzer.iter()) {
            if tool.name.trim().is_empty() {
                return Err(ReconflowError::config("tool with empty name"));
            }
            if tool.timeout_seconds == 0 {
                return Err(ReconflowError::config(format!(
                    "tool '{}' has a zero timeout",
                    tool.name
                )));
            }
        }
        if self.tools.alive.is_empty() {
            return Err(ReconflowError::config("alive stage has no tools"));
        }
        Ok(())
    }

    /// Sets the session root.
    #[must_use]
    pub fn with_session_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.session_root = root.into();
        self
    }

    /// Sets the collision policy.
    #[must_use]
    pub const fn with_session_id_policy(mut self, policy: SessionIdPolicy) -> Self {
        self.session_id_policy = policy;
        self
    }

    /// Replaces the tool chain.
    #[must_use]
    pub fn with_tools(mut self, tools: StageTools) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the analysis collaborator.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: ToolSpec) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Sets the notification transport.
    #[must_use]
    pub fn with_notification(mut self, notification: NotificationConfig) -> Self {
        self.notification = notification;
        self
    }

    /// Sets the approval settings.
    #[must_use]
    pub const fn with_approval(mut self, approval: ApprovalConfig) -> Self {
        self.approval = approval;
        self
    }
}
