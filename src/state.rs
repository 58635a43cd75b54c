use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{CanonicalStateRecord, CompositeIdentity, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// Persisted canonical state records, keyed by composite identity
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    #[serde(default)]
    pub records: BTreeMap<CompositeIdentity, CanonicalStateRecord>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// StateFile Implementation
// ============================================================================

impl StateFile {
    /// Load state from disk, or return default if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!(
            "Loaded {} record(s) from {}",
            state.records.len(),
            path.display()
        );
        Ok(state)
    }

    /// Save state to disk
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// see either the old record set or the new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    // ========================================================================
    // Record Helpers
    // ========================================================================

    /// Apply a cycle outcome: replace on commit, remove on not-found,
    /// leave untouched on failure. Returns whether anything changed.
    pub fn apply_outcome(&mut self, outcome: &Outcome) -> bool {
        outcome.apply_to(&mut self.records)
    }

    pub fn get(&self, identity: &str) -> Option<&CanonicalStateRecord> {
        self.records.get(&CompositeIdentity::from_raw(identity))
    }

    pub fn remove(&mut self, identity: &str) -> Option<CanonicalStateRecord> {
        self.records.remove(&CompositeIdentity::from_raw(identity))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalStateRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
