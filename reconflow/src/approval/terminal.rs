//! Interactive terminal prompt.

use super::{ApprovalRequest, Decision, DecisionChannel};
use crate::core::FindingCategory;
use crate::errors::ApprovalError;
use crate::session::ArtifactStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::{BufRead, IsTerminal, Write};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::warn;

type Writer = Box<dyn Write + Send>;

/// Lines read from one input stream by a dedicated thread.
///
/// Prompts take turns on the receiver. A prompt that is dropped while
/// waiting gives up its turn without consuming a line, so the next answer
/// reaches the next prompt.
struct LineFeed {
    lines: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<String, String>>>,
}

impl LineFeed {
    fn spawn(mut reader: impl BufRead + Send + 'static) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("reconflow-terminal".to_string())
            .spawn(move || loop {
                let mut line = String::new();
                let item = match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => Ok(line),
                    Err(e) => Err(e.to_string()),
                };
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            });
        // Without a reader the receiver reports closed input.
        if let Err(e) = spawned {
            warn!(error = %e, "cannot start terminal reader");
        }
        Arc::new(Self {
            lines: tokio::sync::Mutex::new(rx),
        })
    }
}

/// Stdin is read by one thread for the whole process.
fn stdin_feed() -> Arc<LineFeed> {
    static FEED: OnceLock<Arc<LineFeed>> = OnceLock::new();
    FEED.get_or_init(|| LineFeed::spawn(std::io::BufReader::new(std::io::stdin())))
        .clone()
}

/// Asks the operator on the terminal: `Y` approve, `N` deny, `S` show the
/// summary again, `W` withdraw.
///
/// Reading blocks a dedicated thread, never the async runtime.
#[derive(Clone)]
pub struct TerminalChannel {
    feed: Option<Arc<LineFeed>>,
    writer: Arc<Mutex<Writer>>,
}

impl std::fmt::Debug for TerminalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalChannel")
            .field("stdin", &self.feed.is_none())
            .finish_non_exhaustive()
    }
}

impl Default for TerminalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalChannel {
    /// Prompts on stderr and reads stdin, which must be a terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feed: None,
            writer: Arc::new(Mutex::new(Box::new(std::io::stderr()))),
        }
    }

    /// Prompts on arbitrary streams.
    #[must_use]
    pub fn from_io(reader: impl BufRead + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            feed: Some(LineFeed::spawn(reader)),
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn write(
        &self,
        f: impl FnOnce(&mut dyn Write) -> std::io::Result<()>,
    ) -> Result<(), ApprovalError> {
        let mut writer = self.writer.lock();
        f(&mut *writer)
            .and_then(|()| writer.flush())
            .map_err(|e| ApprovalError::unavailable(e.to_string()))
    }
}

#[async_trait]
impl DecisionChannel for TerminalChannel {
    async fn wait(
        &self,
        request: &ApprovalRequest,
        _store: &ArtifactStore,
    ) -> Result<Decision, ApprovalError> {
        let feed = match &self.feed {
            Some(feed) => feed.clone(),
            None if std::io::stdin().is_terminal() => stdin_feed(),
            None => return Err(ApprovalError::unavailable("stdin is not a terminal")),
        };
        let mut lines = feed.lines.lock().await;

        self.write(|w| write_summary(w, request))?;
        loop {
            self.write(|w| write!(w, "{QUESTION}"))?;
            let line = match lines.recv().await {
                Some(line) => line.map_err(ApprovalError::unavailable)?,
                None => return Err(ApprovalError::unavailable("terminal input closed")),
            };
            match interpret(&line) {
                Reply::Decided(decision) => return Ok(decision),
                Reply::ShowSummary => self.write(|w| write_summary(w, request))?,
                Reply::Invalid => self.write(|w| writeln!(w, "Please answer Y, N, S or W."))?,
            }
        }
    }
}

const QUESTION: &str =
    "Send the report to the developers? [Y]es/[N]o/[S]how summary/[W]ithdraw: ";

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Decided(Decision),
    ShowSummary,
    Invalid,
}

fn interpret(line: &str) -> Reply {
    match line.trim().to_ascii_lowercase().as_str() {
        "s" | "show" => Reply::ShowSummary,
        answer => Decision::parse(answer).map_or(Reply::Invalid, Reply::Decided),
    }
}

fn write_summary(writer: &mut dyn Write, request: &ApprovalRequest) -> std::io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "Approval required: {} ({})", request.target, request.session_id)?;
    writeln!(writer, "  Vulnerabilities: {}", request.vulnerability_count)?;
    for category in FindingCategory::ALL {
        let n = request.findings.iter().filter(|f| f.category == category).count();
        if n > 0 {
            writeln!(writer, "  {}: {n}", category.title())?;
        }
    }
    Ok(())
}
