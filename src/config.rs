use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration for the pipeline, query engine and exports.
///
/// Loaded from `config.toml` when present; every section has defaults so the
/// binary also runs without a file. The category list, segment mapping and
/// tier thresholds live here and are passed into the stages explicitly so
/// tests can substitute them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub acquisition: AcquisitionConfig,
    pub cleaning: CleaningConfig,
    pub tiers: TierConfig,
    pub sampling: SamplingConfig,
    /// Source category -> commercial segment name.
    pub categories: BTreeMap<String, String>,
    /// Source category -> store table name. Categories missing from this map
    /// fall back to the lower-cased category name.
    pub tables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Path of the persisted document store snapshot.
    pub store_path: PathBuf,
    /// Directory holding extracted line-delimited JSON review files.
    pub raw_dir: PathBuf,
    /// Directory for sample exports.
    pub samples_dir: PathBuf,
    /// Path of the per-run preprocessing summary.
    pub summary_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Base URL the per-category gzip archives are fetched from.
    pub base_url: String,
    /// Cap on extracted records per category archive.
    pub target_records_per_category: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub max_text_length: usize,
    pub max_summary_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Minimum rating for the "excellent" tier.
    pub excellent: f64,
    /// Minimum rating for the "good" tier.
    pub good: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub per_category: usize,
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        let categories = [
            ("Books", "Entertainment"),
            ("Video_Games", "Entertainment"),
            ("Movies_and_TV", "Entertainment"),
            ("Home_and_Kitchen", "Home"),
            ("Tools_and_Home_Improvement", "Home"),
            ("Patio_Lawn_and_Garden", "Home"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let tables = [
            ("Books", "books"),
            ("Video_Games", "video_games"),
            ("Movies_and_TV", "movies_tv"),
            ("Home_and_Kitchen", "home_kitchen"),
            ("Tools_and_Home_Improvement", "tools"),
            ("Patio_Lawn_and_Garden", "patio_garden"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            data: DataConfig::default(),
            acquisition: AcquisitionConfig::default(),
            cleaning: CleaningConfig::default(),
            tiers: TierConfig::default(),
            sampling: SamplingConfig::default(),
            categories,
            tables,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/reviews_store.json"),
            raw_dir: PathBuf::from("data/raw"),
            samples_dir: PathBuf::from("data/samples"),
            summary_path: PathBuf::from("data/preprocessing_summary.json"),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://snap.stanford.edu/data/amazon/productGraph/categoryFiles"
                .to_string(),
            target_records_per_category: 200,
            timeout_seconds: 120,
        }
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            max_text_length: 1000,
            max_summary_length: 200,
        }
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            excellent: 4.5,
            good: 3.5,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            per_category: 50,
            seed: 42,
        }
    }
}

impl Config {
    /// Loads `config.toml` from the working directory, falling back to the
    /// built-in defaults when the file does not exist. A present-but-invalid
    /// file is an error rather than a silent fallback.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };

        if let Ok(store_path) = std::env::var("REVIEW_STORE_PATH") {
            if !store_path.trim().is_empty() {
                config.data.store_path = PathBuf::from(store_path);
            }
        }

        Ok(config)
    }

    /// Store table name for a source category.
    pub fn table_for_category(&self, category: &str) -> String {
        self.tables
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.to_lowercase())
    }

    /// Commercial segment name for a source category; categories outside the
    /// configured set map to "Other".
    pub fn segment_for_category(&self, category: &str) -> String {
        self.categories
            .get(category)
            .cloned()
            .unwrap_or_else(|| "Other".to_string())
    }

    /// Categories in deterministic order.
    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Archive file name for a category, following the upstream naming scheme.
    pub fn archive_file_name(category: &str) -> String {
        format!("reviews_{}.json.gz", category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_covers_all_categories() {
        let config = Config::default();
        assert_eq!(config.categories.len(), 6);
        assert_eq!(config.segment_for_category("Books"), "Entertainment");
        assert_eq!(config.segment_for_category("Home_and_Kitchen"), "Home");
        assert_eq!(config.segment_for_category("Automotive"), "Other");
    }

    #[test]
    fn table_mapping_falls_back_to_lowercase() {
        let config = Config::default();
        assert_eq!(config.table_for_category("Movies_and_TV"), "movies_tv");
        assert_eq!(config.table_for_category("Automotive"), "automotive");
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let config = Config::load_from(Path::new("does_not_exist.toml")).unwrap();
        assert_eq!(config.tiers.excellent, 4.5);
        assert_eq!(config.sampling.seed, 42);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [tiers]
            excellent = 4.0
            good = 3.0

            [sampling]
            per_category = 10
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(parsed.tiers.excellent, 4.0);
        assert_eq!(parsed.sampling.per_category, 10);
        // Untouched sections keep defaults
        assert_eq!(parsed.cleaning.max_text_length, 1000);
        assert_eq!(parsed.categories.len(), 6);
    }
}
