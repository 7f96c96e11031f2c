//! Session creation and the pointer files.

use super::store::Area;
use crate::config::{ReconConfig, SessionIdPolicy};
use crate::errors::{Result, SessionError};
use crate::utils::{compact_stamp, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pointer file naming the most recently created session directory.
pub const LATEST_SESSION_FILE: &str = "latest_session";
/// Pointer file naming the most recently rendered report.
pub const LATEST_REPORT_FILE: &str = "latest_report";

const MANIFEST_FILE: &str = "session.json";

/// One target run and the directory tree it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Directory name, unique under the session root.
    pub id: String,
    /// The target as given by the operator.
    pub target: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Absolute session directory.
    pub root: PathBuf,
}

impl Session {
    /// Loads a session from its directory manifest.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = dir.join(MANIFEST_FILE);
        let text = match std::fs::read_to_string(&manifest) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::MissingManifest {
                    path: dir.to_path_buf(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&text)?)
    }

    /// Directory of one artifact area.
    #[must_use]
    pub fn area_dir(&self, area: Area) -> PathBuf {
        self.root.join(area.dir_name())
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
///
/// # Examples
///
/// ```
/// use reconflow::session::sanitize_target;
///
/// assert_eq!(sanitize_target("https://example.com/a"), "https___example.com_a");
/// ```
#[must_use]
pub fn sanitize_target(target: &str) -> String {
    target
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Creates sessions under a root directory and maintains the pointer files.
#[derive(Debug, Clone)]
pub struct SessionManager {
    root: PathBuf,
    policy: SessionIdPolicy,
}

impl SessionManager {
    /// Creates a manager for the given root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: SessionIdPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// Creates a manager from configuration.
    #[must_use]
    pub fn from_config(config: &ReconConfig) -> Self {
        Self::new(config.session_root.clone(), config.session_id_policy)
    }

    /// The session root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a new session for `target`.
    ///
    /// The directory is `<sanitized target>_<YYYYmmdd_HHMMSS>`, so different
    /// targets never collide. Same-target collisions follow the configured
    /// [`SessionIdPolicy`]. Overwrites the latest-session pointer.
    pub fn create(&self, target: &str) -> Result<Session> {
        let target = target.trim();
        let base = sanitize_target(target);
        if base.is_empty() || base.chars().all(|c| c == '.') {
            return Err(SessionError::InvalidTarget(target.to_string()).into());
        }

        std::fs::create_dir_all(&self.root)?;
        let root = std::fs::canonicalize(&self.root)?;

        let created_at = now_utc();
        let stem = format!("{base}_{}", compact_stamp(&created_at));
        let (id, dir) = self.claim_dir(&root, &stem)?;

        for area in Area::ALL {
            std::fs::create_dir_all(dir.join(area.dir_name()))?;
        }

        let session = Session {
            id,
            target: target.to_string(),
            created_at,
            root: dir,
        };
        std::fs::write(
            session.root.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&session)?,
        )?;
        self.write_pointer(LATEST_SESSION_FILE, &session.root)?;

        debug!(session = %session.id, target = %session.target, "session created");
        Ok(session)
    }

    fn claim_dir(&self, root: &Path, stem: &str) -> Result<(String, PathBuf)> {
        let mut attempt = 1u32;
        loop {
            let id = if attempt == 1 {
                stem.to_string()
            } else {
                format!("{stem}-{attempt}")
            };
            let dir = root.join(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if self.policy == SessionIdPolicy::Fail {
                        return Err(SessionError::Collision { path: dir }.into());
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The most recently created session, if the pointer resolves.
    pub fn latest(&self) -> Result<Option<Session>> {
        let Some(dir) = self.read_pointer(LATEST_SESSION_FILE)? else {
            return Ok(None);
        };
        match Session::load(&dir) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(pointer = %dir.display(), error = %e, "latest session pointer is stale");
                Ok(None)
            }
        }
    }

    /// Points the latest-report pointer at `report`.
    pub fn record_latest_report(&self, report: &Path) -> Result<()> {
        self.write_pointer(LATEST_REPORT_FILE, report)
    }

    /// The most recently rendered report, if any.
    pub fn latest_report(&self) -> Result<Option<PathBuf>> {
        self.read_pointer(LATEST_REPORT_FILE)
    }

    fn write_pointer(&self, name: &str, target: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let tmp = self.root.join(format!(".{name}.tmp"));
        std::fs::write(&tmp, format!("{}\n", target.display()))?;
        std::fs::rename(&tmp, self.root.join(name))?;
        Ok(())
    }

    fn read_pointer(&self, name: &str) -> Result<Option<PathBuf>> {
        match std::fs::read_to_string(self.root.join(name)) {
            Ok(text) => {
                let trimmed = text.trim();
                Ok((!trimmed.is_empty()).then(|| PathBuf::from(trimmed)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReconflowError;

    #[test]
    fn test_create_lays_out_areas() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Suffix);

        let session = manager.create("example.com").unwrap();
        assert!(session.root.is_absolute());
        assert!(session.id.starts_with("example.com_"));
        for area in Area::ALL {
            assert!(session.area_dir(area).is_dir(), "{area:?} missing");
        }
        assert_eq!(Session::load(&session.root).unwrap(), session);
    }

    #[test]
    fn test_different_targets_same_second_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Fail);

        let a = manager.create("a.example.com").unwrap();
        let b = manager.create("b.example.com").unwrap();
        assert_ne!(a.root, b.root);
    }

    #[test]
    fn test_same_target_collision_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Suffix);
        let root = std::fs::canonicalize(dir.path()).unwrap();

        let stem = format!("example.com_{}", compact_stamp(&now_utc()));
        std::fs::create_dir(root.join(&stem)).unwrap();

        let (id, path) = manager.claim_dir(&root, &stem).unwrap();
        assert_eq!(id, format!("{stem}-2"));
        assert!(path.is_dir());

        let (id, _) = manager.claim_dir(&root, &stem).unwrap();
        assert_eq!(id, format!("{stem}-3"));
    }

    #[test]
    fn test_same_target_collision_fail() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Fail);
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(root.join("taken")).unwrap();

        let err = manager.claim_dir(&root, "taken").unwrap_err();
        assert!(matches!(
            err,
            ReconflowError::Session(SessionError::Collision { .. })
        ));
    }

    #[test]
    fn test_latest_pointer_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Suffix);
        assert!(manager.latest().unwrap().is_none());

        manager.create("first.example").unwrap();
        let second = manager.create("second.example").unwrap();

        let latest = manager.latest().unwrap().unwrap();
        assert_eq!(latest, second);

        let pointer = std::fs::read_to_string(dir.path().join(LATEST_SESSION_FILE)).unwrap();
        assert_eq!(PathBuf::from(pointer.trim()), second.root);
    }

    #[test]
    fn test_latest_report_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Suffix);
        assert!(manager.latest_report().unwrap().is_none());

        let report = dir.path().join("x").join("report.md");
        manager.record_latest_report(&report).unwrap();
        assert_eq!(manager.latest_report().unwrap(), Some(report));
    }

    #[test]
    fn test_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path(), SessionIdPolicy::Suffix);
        assert!(manager.create("   ").is_err());
        assert!(manager.create("..").is_err());
    }

    #[test]
    fn test_sanitize_target() {
        assert_eq!(sanitize_target("example.com"), "example.com");
        assert_eq!(sanitize_target(" a b/c "), "a_b_c");
        assert_eq!(sanitize_target("*.example.com"), "_.example.com");
    }
}
