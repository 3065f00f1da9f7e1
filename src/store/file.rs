//! JSON-file simulation store.
//!
//! Layout:
//!
//! ```text
//! <dir>/<simulation_id>/simulation.json
//! <dir>/<simulation_id>/round_001.json
//! <dir>/<simulation_id>/round_002.json
//! ```
//!
//! Records are replaced via write-to-temp + rename; rounds are written once.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use super::{apply_final, apply_progress, SimulationStore};
use crate::domain::{RoundRecord, SimulationFinal, SimulationProgress, SimulationRecord};
use crate::error::{FulcrumError, Result};

const RECORD_FILE: &str = "simulation.json";

/// Simulation store writing JSON documents under a directory.
#[derive(Debug)]
pub struct FileSimulationStore {
    root: PathBuf,
    // serializes read-modify-write of record files
    write_lock: Mutex<()>,
}

impl FileSimulationStore {
    /// Store rooted at `root`, created if missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::info!(path = %root.display(), "simulation store opened");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn simulation_dir(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FulcrumError::Storage(format!("invalid simulation id {id:?}")));
        }
        Ok(self.root.join(id))
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.simulation_dir(id)?.join(RECORD_FILE))
    }

    async fn read_record(&self, id: &str) -> Result<Option<SimulationRecord>> {
        read_json(&self.record_path(id)?).await
    }

    async fn update_record(
        &self,
        id: &str,
        update: impl FnOnce(&mut SimulationRecord),
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read_record(id)
            .await?
            .ok_or_else(|| FulcrumError::Storage(format!("unknown simulation {id}")))?;
        update(&mut record);
        write_json(&self.record_path(id)?, &record).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

impl SimulationStore for FileSimulationStore {
    fn create_simulation<'a>(&'a self, record: &'a SimulationRecord) -> BoxFuture<'a, Result<()>> {
        async move {
            let _guard = self.write_lock.lock().await;
            let dir = self.simulation_dir(&record.id)?;
            let path = dir.join(RECORD_FILE);
            if tokio::fs::try_exists(&path).await? {
                return Err(FulcrumError::Storage(format!(
                    "simulation {} already exists",
                    record.id
                )));
            }
            tokio::fs::create_dir_all(&dir).await?;
            write_json(&path, record).await
        }
        .boxed()
    }

    fn record_round<'a>(&'a self, round: &'a RoundRecord) -> BoxFuture<'a, Result<()>> {
        async move {
            let record = self.record_path(&round.simulation_id)?;
            if !tokio::fs::try_exists(&record).await? {
                return Err(FulcrumError::Storage(format!(
                    "unknown simulation {}",
                    round.simulation_id
                )));
            }
            let path = self
                .simulation_dir(&round.simulation_id)?
                .join(format!("round_{:03}.json", round.round_number));
            write_json(&path, round).await
        }
        .boxed()
    }

    fn update_progress<'a>(
        &'a self,
        simulation_id: &'a str,
        progress: &'a SimulationProgress,
    ) -> BoxFuture<'a, Result<()>> {
        self.update_record(simulation_id, move |record| apply_progress(record, progress))
            .boxed()
    }

    fn finalize<'a>(
        &'a self,
        simulation_id: &'a str,
        outcome: &'a SimulationFinal,
    ) -> BoxFuture<'a, Result<()>> {
        self.update_record(simulation_id, move |record| apply_final(record, outcome))
            .boxed()
    }

    fn get_simulation<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SimulationRecord>>> {
        self.read_record(id).boxed()
    }

    fn get_rounds<'a>(&'a self, simulation_id: &'a str) -> BoxFuture<'a, Result<Vec<RoundRecord>>> {
        async move {
            let dir = self.simulation_dir(simulation_id)?;
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut rounds = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with("round_") && name.ends_with(".json") {
                    if let Some(round) = read_json::<RoundRecord>(&entry.path()).await? {
                        rounds.push(round);
                    }
                }
            }
            rounds.sort_by_key(|r| r.round_number);
            Ok(rounds)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrossEntityAnalysis, SimulationConfig, SimulationStatus};

    fn round(sim: &str, n: u32) -> RoundRecord {
        let now = chrono::Utc::now();
        RoundRecord {
            simulation_id: sim.into(),
            round_number: n,
            responses: Vec::new(),
            analysis: CrossEntityAnalysis {
                round_number: n,
                ..Default::default()
            },
            skipped: Vec::new(),
            duration_ms: 1,
            started_at: now,
            completed_at: now,
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSimulationStore::open(dir.path().join("sims")).await.unwrap();

        let record = SimulationRecord::new("sim-1", "s1", Some("org".into()), SimulationConfig::default(), Vec::new());
        store.create_simulation(&record).await.unwrap();
        assert!(store.create_simulation(&record).await.is_err());

        store.record_round(&round("sim-1", 2)).await.unwrap();
        store.record_round(&round("sim-1", 1)).await.unwrap();
        store
            .update_progress(
                "sim-1",
                &SimulationProgress {
                    rounds_completed: 2,
                    stabilization_score: Some(0.85),
                },
            )
            .await
            .unwrap();
        store
            .finalize(
                "sim-1",
                &SimulationFinal {
                    status: SimulationStatus::Stabilized,
                    rounds_completed: 2,
                    stabilization_score: Some(0.85),
                    dominant_narratives: Vec::new(),
                    key_coalitions: Vec::new(),
                    gaps_identified: vec!["jobs".into()],
                    fulcrums: Vec::new(),
                    error: None,
                },
            )
            .await
            .unwrap();

        // a fresh handle sees the persisted state
        let reopened = FileSimulationStore::open(dir.path().join("sims")).await.unwrap();
        let stored = reopened.get_simulation("sim-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SimulationStatus::Stabilized);
        assert_eq!(stored.gaps_identified, vec!["jobs"]);
        assert_eq!(stored.organization_id.as_deref(), Some("org"));

        let rounds = reopened.get_rounds("sim-1").await.unwrap();
        assert_eq!(rounds.iter().map(|r| r.round_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSimulationStore::open(dir.path()).await.unwrap();

        assert!(store.get_simulation("absent").await.unwrap().is_none());
        assert!(store.get_rounds("absent").await.unwrap().is_empty());
        assert!(store.record_round(&round("absent", 1)).await.is_err());
        assert!(store.get_simulation("../etc").await.is_err());
        assert!(store
            .update_progress(
                "absent",
                &SimulationProgress {
                    rounds_completed: 1,
                    stabilization_score: None,
                },
            )
            .await
            .is_err());
    }
}
