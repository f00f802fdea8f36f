use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::SamplingConfig;
use crate::domain::ReviewDocument;
use crate::error::Result;
use crate::storage::{Storage, MASTER_TABLE};

/// Exports a representative subset of the store: a seeded stratified sample
/// of up to `per_category` documents from each category table, written as a
/// plain JSON array in the stored document shape. External consumers get the
/// documents without needing to understand the store format.
pub struct SampleExporter {
    config: SamplingConfig,
}

impl SampleExporter {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    /// Samples every category table and writes the combined array to
    /// `out_path`. Returns the number of exported documents. The seed makes
    /// repeated exports of the same store identical.
    pub async fn export(&self, storage: &Arc<dyn Storage>, out_path: &Path) -> Result<usize> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut sampled: Vec<ReviewDocument> = Vec::new();

        let mut tables = storage.table_names().await?;
        tables.retain(|name| name != MASTER_TABLE);
        tables.sort();

        for table in &tables {
            let documents = storage.get_all(table).await?;
            sampled.extend(stratum(&documents, self.config.per_category, &mut rng));
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = out_path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&sampled)?)?;
        fs::rename(&tmp_path, out_path)?;

        info!(
            path = %out_path.display(),
            documents = sampled.len(),
            tables = tables.len(),
            "Exported representative sample"
        );
        Ok(sampled.len())
    }
}

/// Up to `size` documents from one table, keeping the table's insertion
/// order within the sample.
fn stratum(documents: &[ReviewDocument], size: usize, rng: &mut StdRng) -> Vec<ReviewDocument> {
    if documents.len() <= size {
        return documents.to_vec();
    }
    let mut indexes = rand::seq::index::sample(rng, documents.len(), size).into_vec();
    indexes.sort_unstable();
    indexes.into_iter().map(|i| documents[i].clone()).collect()
}
