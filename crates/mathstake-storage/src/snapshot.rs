use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use mathstake_types::{
    PayoutHandoff, Problem, ProblemId, Profile, ProfileId, Solution, SolutionId, Transaction,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Full market state. Also the on-disk snapshot body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketState {
    pub problems: BTreeMap<ProblemId, Problem>,
    pub solutions: BTreeMap<SolutionId, Solution>,
    pub profiles: BTreeMap<ProfileId, Profile>,
    pub transactions: Vec<Transaction>,
    pub handoffs: Vec<PayoutHandoff>,
    #[serde(skip)]
    pub(crate) submitter_index: HashSet<(ProblemId, ProfileId)>,
}

impl MarketState {
    pub(crate) fn rebuild_indexes(&mut self) {
        self.submitter_index = self
            .solutions
            .values()
            .map(|s| (s.problem_id, s.submitter))
            .collect();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub problem_count: usize,
    pub solution_count: usize,
    pub profile_count: usize,
    pub transaction_count: usize,
    /// blake3 of the serialized state, hex.
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub state: MarketState,
}

impl Snapshot {
    pub fn create(state: &MarketState) -> Result<Self> {
        let body = serde_json::to_vec(state)?;
        let metadata = SnapshotMetadata {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            problem_count: state.problems.len(),
            solution_count: state.solutions.len(),
            profile_count: state.profiles.len(),
            transaction_count: state.transactions.len(),
            hash: blake3::hash(&body).to_hex().to_string(),
        };
        Ok(Self {
            metadata,
            state: state.clone(),
        })
    }

    /// Writes to a sibling temp file, then renames over `path`.
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await?;

        info!(
            path = %path.display(),
            problems = self.metadata.problem_count,
            transactions = self.metadata.transaction_count,
            "💾 Snapshot saved"
        );
        Ok(())
    }

    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).await?;
        let mut snapshot: Snapshot = serde_json::from_slice(&data)?;

        if snapshot.metadata.version != SNAPSHOT_VERSION {
            return Err(StorageError::SerializationError(format!(
                "unsupported snapshot version {}",
                snapshot.metadata.version
            )));
        }

        let body = serde_json::to_vec(&snapshot.state)?;
        let hash = blake3::hash(&body).to_hex().to_string();
        if hash != snapshot.metadata.hash {
            return Err(StorageError::SerializationError(
                "snapshot hash mismatch".to_string(),
            ));
        }

        snapshot.state.rebuild_indexes();
        info!(
            path = %path.display(),
            problems = snapshot.metadata.problem_count,
            "📂 Snapshot loaded"
        );
        Ok(snapshot)
    }
}
