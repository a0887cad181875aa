//! The parts of a hub `config.json` needed before any weights are fetched.

use serde::Deserialize;
use std::str::FromStr;
use strum::IntoEnumIterator;

use crate::backends::{Error, ErrorKind};

/// Model families this gateway can run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Architecture {
    Llama,
    Qwen2,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EosTokenId {
    Single(u32),
    Multiple(Vec<u32>),
}

#[derive(Deserialize)]
struct Header {
    model_type: Option<String>,
    eos_token_id: Option<EosTokenId>,
}

#[derive(Debug, Clone)]
pub(crate) struct ModelConfig {
    pub architecture: Architecture,
    pub eos_token_ids: Vec<u32>,
    /// The full document, deserialized again by the architecture's own config type.
    pub raw: String,
}

impl ModelConfig {
    pub(crate) fn parse(raw: String) -> Result<ModelConfig, Error> {
        let header: Header = serde_json::from_str(&raw)
            .map_err(|e| Error::from_source(ErrorKind::Configuration, e))?;

        let model_type = header.model_type.ok_or_else(|| {
            Error::from_source(ErrorKind::Configuration, "config.json does not declare a model_type")
        })?;

        let architecture = Architecture::from_str(&model_type).map_err(|_| {
            Error::from_source(
                ErrorKind::UnsupportedArchitecture,
                format!(
                    "\"{}\" (supported: {})",
                    model_type,
                    Architecture::iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )
        })?;

        let eos_token_ids = match header.eos_token_id {
            Some(EosTokenId::Single(id)) => vec![id],
            Some(EosTokenId::Multiple(ids)) => ids,
            None => Vec::new(),
        };

        Ok(ModelConfig {
            architecture,
            eos_token_ids,
            raw,
        })
    }
}
