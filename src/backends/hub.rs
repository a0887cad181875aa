//! Loads backends from the Hugging Face Hub.
//!
//! Files are fetched through the hub's local cache, so repeated loads of the same
//! pinned revision only touch the disk. The configuration is fetched first; a
//! model with an unsupported architecture fails before any weights are
//! downloaded.

mod architecture;
mod candle;

use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use self::architecture::ModelConfig;
use self::candle::{CandleModel, HfTokenizer};
use super::{
    BackendHandle, BackendKey, BackendLoader, BackendSpec, Device, Error, ErrorKind, LoadFailure,
};
use crate::registry::catalog::CatalogEntry;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

#[derive(Deserialize)]
struct WeightsIndex {
    weight_map: HashMap<String, String>,
}

struct ModelFiles {
    config: ModelConfig,
    tokenizer: PathBuf,
    weights: Vec<PathBuf>,
}

pub(crate) struct HubLoader {
    api: Api,
}

impl HubLoader {
    pub(crate) fn new(cache_dir: Option<&Path>) -> Result<HubLoader, Error> {
        let mut builder = ApiBuilder::new().with_progress(false);

        if let Some(cache_dir) = cache_dir {
            builder = builder.with_cache_dir(cache_dir.to_path_buf());
        }

        let api = builder
            .build()
            .map_err(|e| Error::from_source(ErrorKind::Fetch, e))?;

        Ok(HubLoader { api })
    }

    fn repo(&self, spec: &BackendSpec) -> ApiRepo {
        self.api.repo(Repo::with_revision(
            spec.model_id.clone(),
            RepoType::Model,
            spec.revision.clone(),
        ))
    }

    async fn fetch(&self, spec: &BackendSpec) -> Result<ModelFiles, Error> {
        let repo = self.repo(spec);

        let config = get(&repo, CONFIG_FILE).await?;
        let config = tokio::fs::read_to_string(&config)
            .await
            .map_err(|e| Error::from_source(ErrorKind::Fetch, e))?;
        let config = ModelConfig::parse(config)?;

        let tokenizer = get(&repo, TOKENIZER_FILE).await?;

        let weights = match repo.get(WEIGHTS_FILE).await {
            Ok(weights) => vec![weights],
            Err(err) => {
                debug!(model = %spec, "no single weights file ({}), trying shards", err);

                let index = get(&repo, WEIGHTS_INDEX_FILE).await?;

                let mut shards = Vec::new();
                for shard in shard_names(&index).await? {
                    shards.push(get(&repo, &shard).await?);
                }

                shards
            }
        };

        Ok(ModelFiles {
            config,
            tokenizer,
            weights,
        })
    }

    async fn load_spec(
        &self,
        key: &BackendKey,
        spec: &BackendSpec,
        device: Device,
    ) -> Result<BackendHandle, Error> {
        let files = self.fetch(spec).await?;

        debug!(
            %key,
            architecture = %files.config.architecture,
            shards = files.weights.len(),
            "model files are available"
        );

        let key = key.clone();

        // Parsing the tokenizer and mapping the weights is blocking work.
        tokio::task::spawn_blocking(move || -> Result<BackendHandle, Error> {
            let tokenizer = HfTokenizer::from_file(&files.tokenizer)?;
            let model = CandleModel::load(&files.config, &files.weights, device)?;

            Ok(BackendHandle::new(
                key,
                Box::new(tokenizer),
                Box::new(model),
                device,
            ))
        })
        .await
        .map_err(|e| Error::from_source(ErrorKind::Internal, e))?
    }
}

async fn get(repo: &ApiRepo, file: &str) -> Result<PathBuf, Error> {
    repo.get(file).await.map_err(|e| {
        Error::from_source(ErrorKind::Fetch, format!("{}: {}", file, e))
    })
}

async fn shard_names(index: &Path) -> Result<BTreeSet<String>, Error> {
    let index = tokio::fs::read_to_string(index)
        .await
        .map_err(|e| Error::from_source(ErrorKind::Fetch, e))?;

    parse_shard_names(&index)
}

fn parse_shard_names(index: &str) -> Result<BTreeSet<String>, Error> {
    let index: WeightsIndex =
        serde_json::from_str(index).map_err(|e| Error::from_source(ErrorKind::Weights, e))?;

    Ok(index.weight_map.into_values().collect())
}

#[async_trait]
impl BackendLoader for HubLoader {
    async fn load(&self, entry: &CatalogEntry, device: Device) -> Result<BackendHandle, LoadFailure> {
        self.load_spec(&entry.key, &entry.spec, device)
            .await
            .map_err(|source| LoadFailure::new(entry.key.clone(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_names_are_unique_and_sorted() {
        let index = r#"{
            "metadata": {"total_size": 3},
            "weight_map": {
                "lm_head.weight": "model-00002-of-00002.safetensors",
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.norm.weight": "model-00002-of-00002.safetensors"
            }
        }"#;

        let shards: Vec<String> = parse_shard_names(index).unwrap().into_iter().collect();

        assert_eq!(
            shards,
            [
                "model-00001-of-00002.safetensors",
                "model-00002-of-00002.safetensors"
            ]
        );
    }

    #[test]
    fn test_malformed_index() {
        let err = parse_shard_names(r#"{"metadata": {}}"#).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Weights);
    }
}
