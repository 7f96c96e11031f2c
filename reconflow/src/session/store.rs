//! Write-set enforced access to a session's artifact areas.

use super::Session;
use crate::core::StageOutcome;
use crate::errors::{ReconflowError, Result, WriteSetViolation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File (in [`Area::Vulnerabilities`]) holding the vulnerability count.
pub const VULN_COUNT_FILE: &str = "vuln_count.txt";

const OUTCOMES_FILE: &str = "stage_outcomes.jsonl";

/// Fixed sub-directories of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    /// Subdomain discovery output.
    Recon,
    /// Live hosts.
    Alive,
    /// Collected URLs.
    Urls,
    /// Scanner output and the vulnerability count.
    Vulnerabilities,
    /// Rendered reports.
    Reports,
    /// Tool stderr captures and the outcome ledger.
    Logs,
    /// Approval request and decision records.
    Approval,
}

impl Area {
    /// Every area, in layout order.
    pub const ALL: [Self; 7] = [
        Self::Recon,
        Self::Alive,
        Self::Urls,
        Self::Vulnerabilities,
        Self::Reports,
        Self::Logs,
        Self::Approval,
    ];

    /// Directory name inside the session.
    #[must_use]
    pub const fn dir_name(&self) -> &'static str {
        match self {
            Self::Recon => "recon",
            Self::Alive => "alive",
            Self::Urls => "urls",
            Self::Vulnerabilities => "vulnerabilities",
            Self::Reports => "reports",
            Self::Logs => "logs",
            Self::Approval => "approval",
        }
    }

    /// The only role allowed to write here.
    #[must_use]
    pub const fn owner(&self) -> Role {
        match self {
            Self::Approval => Role::Approval,
            _ => Role::Pipeline,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Who is accessing the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The stage pipeline and the gateway it drives.
    Pipeline,
    /// A detached approval unit.
    Approval,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "pipeline"),
            Self::Approval => write!(f, "approval"),
        }
    }
}

/// A role-scoped view of one session's directory tree.
///
/// The pipeline may write every area except `approval`; an approval unit
/// may write only `approval` and read only its own records plus the
/// vulnerability count.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    session: Session,
    role: Role,
}

impl ArtifactStore {
    /// The pipeline's view of a session.
    #[must_use]
    pub fn for_pipeline(session: &Session) -> Self {
        Self {
            session: session.clone(),
            role: Role::Pipeline,
        }
    }

    /// An approval unit's view of a session.
    #[must_use]
    pub fn for_approval(session: &Session) -> Self {
        Self {
            session: session.clone(),
            role: Role::Approval,
        }
    }

    /// The session this store serves.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The accessing role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Directory of an area.
    #[must_use]
    pub fn area_dir(&self, area: Area) -> PathBuf {
        self.session.area_dir(area)
    }

    /// Path of a file in an area, for reading.
    pub fn path(&self, area: Area, name: &str) -> Result<PathBuf> {
        self.check_read(area, name)?;
        Ok(self.area_dir(area).join(name))
    }

    /// Path of a file in an area, for writing.
    ///
    /// Fails with a write-set violation when the role does not own the area.
    pub fn writable_path(&self, area: Area, name: &str) -> Result<PathBuf> {
        self.check_write(area)?;
        let dir = self.area_dir(area);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(name))
    }

    /// Writes a whole file.
    pub fn write(&self, area: Area, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.writable_path(area, name)?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Writes one entry per line.
    pub fn write_lines<S: AsRef<str>>(&self, area: Area, name: &str, lines: &[S]) -> Result<PathBuf> {
        let path = self.writable_path(area, name)?;
        crate::utils::write_lines(&path, lines)?;
        Ok(path)
    }

    /// Reads a whole file; `None` when it does not exist.
    pub fn read(&self, area: Area, name: &str) -> Result<Option<String>> {
        let path = self.path(area, name)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the non-blank lines of a file.
    pub fn read_lines(&self, area: Area, name: &str) -> Result<Vec<String>> {
        let path = self.path(area, name)?;
        Ok(crate::utils::read_lines(&path)?)
    }

    /// Writes the vulnerability count artifact.
    pub fn write_vuln_count(&self, count: u64) -> Result<PathBuf> {
        self.write(Area::Vulnerabilities, VULN_COUNT_FILE, format!("{count}\n"))
    }

    /// Reads the vulnerability count artifact; `None` when absent.
    pub fn read_vuln_count(&self) -> Result<Option<u64>> {
        let Some(text) = self.read(Area::Vulnerabilities, VULN_COUNT_FILE)? else {
            return Ok(None);
        };
        text.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ReconflowError::Serialization(format!("bad vulnerability count: {e}")))
    }

    /// Appends a stage outcome to the session's outcome ledger.
    pub fn append_outcome(&self, outcome: &StageOutcome) -> Result<()> {
        let path = self.writable_path(Area::Logs, OUTCOMES_FILE)?;
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Reads back the outcome ledger.
    pub fn outcomes(&self) -> Result<Vec<StageOutcome>> {
        self.read_lines(Area::Logs, OUTCOMES_FILE)?
            .iter()
            .map(|line| serde_json::from_str(line).map_err(ReconflowError::from))
            .collect()
    }

    /// Returns true if a file exists and has content.
    #[must_use]
    pub fn is_non_empty(path: &Path) -> bool {
        std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
    }

    fn check_write(&self, area: Area) -> Result<()> {
        if area.owner() == self.role {
            Ok(())
        } else {
            Err(WriteSetViolation::new(area.dir_name(), self.role.to_string()).into())
        }
    }

    fn check_read(&self, area: Area, name: &str) -> Result<()> {
        let allowed = match self.role {
            Role::Pipeline => true,
            Role::Approval => {
                area == Area::Approval || (area == Area::Vulnerabilities && name == VULN_COUNT_FILE)
            }
        };
        if allowed {
            Ok(())
        } else {
            Err(ReconflowError::ReadSet {
                role: self.role.to_string(),
                path: format!("{}/{name}", area.dir_name()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionIdPolicy;
    use crate::core::OutcomeStatus;
    use crate::session::SessionManager;
    use chrono::Utc;

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionManager::new(dir.path(), SessionIdPolicy::Suffix)
            .create("example.com")
            .unwrap();
        (dir, session)
    }

    #[test]
    fn test_pipeline_cannot_write_approval_area() {
        let (_dir, session) = session();
        let store = ArtifactStore::for_pipeline(&session);

        assert!(store.write(Area::Recon, "subfinder.txt", "a\n").is_ok());
        let err = store.write(Area::Approval, "request.json", "{}").unwrap_err();
        assert!(matches!(err, ReconflowError::WriteSet(_)));
    }

    #[test]
    fn test_approval_write_set() {
        let (_dir, session) = session();
        let store = ArtifactStore::for_approval(&session);

        assert!(store.write(Area::Approval, "request.json", "{}").is_ok());
        for area in [
            Area::Recon,
            Area::Alive,
            Area::Urls,
            Area::Vulnerabilities,
            Area::Reports,
            Area::Logs,
        ] {
            let err = store.write(area, "x.txt", "x").unwrap_err();
            assert!(matches!(err, ReconflowError::WriteSet(_)), "{area} writable");
        }
        assert!(store.write_vuln_count(9).is_err());
    }

    #[test]
    fn test_approval_reads_only_count_and_own_records() {
        let (_dir, session) = session();
        let pipeline = ArtifactStore::for_pipeline(&session);
        pipeline.write(Area::Vulnerabilities, "nuclei.txt", "hit\n").unwrap();
        pipeline.write_vuln_count(3).unwrap();

        let approval = ArtifactStore::for_approval(&session);
        assert_eq!(approval.read_vuln_count().unwrap(), Some(3));
        assert!(matches!(
            approval.read(Area::Vulnerabilities, "nuclei.txt").unwrap_err(),
            ReconflowError::ReadSet { .. }
        ));
        assert!(approval.read(Area::Approval, "request.json").unwrap().is_none());
    }

    #[test]
    fn test_vuln_count_roundtrip_and_absence() {
        let (_dir, session) = session();
        let store = ArtifactStore::for_pipeline(&session);
        assert_eq!(store.read_vuln_count().unwrap(), None);

        let path = store.write_vuln_count(0).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "0\n");
        assert_eq!(store.read_vuln_count().unwrap(), Some(0));
    }

    #[test]
    fn test_outcome_ledger() {
        let (_dir, session) = session();
        let store = ArtifactStore::for_pipeline(&session);

        let outcome = StageOutcome::success("recon", Utc::now());
        store.append_outcome(&outcome).unwrap();
        store
            .append_outcome(&StageOutcome::failed("alive_check", Utc::now(), "no hosts"))
            .unwrap();

        let outcomes = store.outcomes().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], outcome);
        assert_eq!(outcomes[1].status, OutcomeStatus::Failed);
    }

    #[test]
    fn test_is_non_empty() {
        let (_dir, session) = session();
        let store = ArtifactStore::for_pipeline(&session);
        let empty = store.write(Area::Urls, "empty.txt", "").unwrap();
        let full = store.write(Area::Urls, "full.txt", "x").unwrap();

        assert!(!ArtifactStore::is_non_empty(&empty));
        assert!(ArtifactStore::is_non_empty(&full));
        assert!(!ArtifactStore::is_non_empty(&store.area_dir(Area::Urls)));
    }
}
