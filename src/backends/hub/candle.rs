//! Tokenizer and model capabilities backed by `tokenizers` and `candle`.

use candle_core::{DType, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{self, Cache, Llama, LlamaConfig};
use candle_transformers::models::qwen2;
use std::path::{Path, PathBuf};

use super::architecture::{Architecture, ModelConfig};
use crate::backends::{CausalModel, Device, Error, ErrorKind, TextTokenizer};

pub(crate) struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub(crate) fn from_file(path: &Path) -> Result<HfTokenizer, Error> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| Error::from_source(ErrorKind::Tokenizer, e))?;

        Ok(HfTokenizer { inner })
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, Error> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| Error::from_source(ErrorKind::Tokenizer, e))?;

        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, Error> {
        self.inner
            .decode(ids, true)
            .map_err(|e| Error::from_source(ErrorKind::Decoding, e))
    }
}

enum Weights {
    /// Llama keeps its key/value cache outside the model, so generations can
    /// run concurrently.
    Llama { model: Llama, config: llama::Config },
    /// Qwen2 keeps the cache inside the model. Every generation works on its
    /// own clone, which shares the weights and starts with an empty cache.
    Qwen2(qwen2::ModelForCausalLM),
}

pub(crate) struct CandleModel {
    weights: Weights,
    device: candle_core::Device,
    dtype: DType,
    eos_token_ids: Vec<u32>,
}

pub(crate) fn candle_device(device: Device) -> Result<candle_core::Device, Error> {
    match device {
        Device::Cpu => Ok(candle_core::Device::Cpu),
        Device::Accelerator => candle_core::Device::new_cuda(0)
            .map_err(|e| Error::from_source(ErrorKind::Device, e)),
    }
}

fn weights_error(e: candle_core::Error) -> Error {
    Error::from_source(ErrorKind::Weights, e)
}

impl CandleModel {
    pub(crate) fn load(
        config: &ModelConfig,
        weights: &[PathBuf],
        device: Device,
    ) -> Result<CandleModel, Error> {
        let dtype = match device {
            Device::Cpu => DType::F32,
            Device::Accelerator => DType::BF16,
        };
        let device = candle_device(device)?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights, dtype, &device) }
            .map_err(weights_error)?;

        CandleModel::from_var_builder(config, vb, device, dtype)
    }

    fn from_var_builder(
        config: &ModelConfig,
        vb: VarBuilder,
        device: candle_core::Device,
        dtype: DType,
    ) -> Result<CandleModel, Error> {
        let weights = match config.architecture {
            Architecture::Llama => {
                let llama_config: LlamaConfig = serde_json::from_str(&config.raw)
                    .map_err(|e| Error::from_source(ErrorKind::Configuration, e))?;
                let llama_config = llama_config.into_config(false);

                let model = Llama::load(vb, &llama_config).map_err(weights_error)?;

                Weights::Llama {
                    model,
                    config: llama_config,
                }
            }
            Architecture::Qwen2 => {
                let qwen_config: qwen2::Config = serde_json::from_str(&config.raw)
                    .map_err(|e| Error::from_source(ErrorKind::Configuration, e))?;

                let model = qwen2::ModelForCausalLM::new(&qwen_config, vb).map_err(weights_error)?;

                Weights::Qwen2(model)
            }
        };

        Ok(CandleModel {
            weights,
            device,
            dtype,
            eos_token_ids: config.eos_token_ids.clone(),
        })
    }

    /// Greedy decoding. `forward` receives the ids not yet seen by the model and
    /// the number of ids it has already cached.
    fn decode_greedy<F>(
        &self,
        prompt: &[u32],
        max_new_tokens: usize,
        mut forward: F,
    ) -> candle_core::Result<Vec<u32>>
    where
        F: FnMut(&Tensor, usize) -> candle_core::Result<Tensor>,
    {
        let mut generated = Vec::new();
        let mut pending = prompt.to_vec();
        let mut position = 0;

        while generated.len() < max_new_tokens {
            let input = Tensor::new(pending.as_slice(), &self.device)?.unsqueeze(0)?;

            let logits = forward(&input, position)?;

            // Only the logits of the last position remain after the forward pass.
            let next = logits
                .flatten_all()?
                .to_dtype(DType::F32)?
                .argmax(D::Minus1)?
                .to_scalar::<u32>()?;

            position += pending.len();

            if self.eos_token_ids.contains(&next) {
                break;
            }

            generated.push(next);
            pending = vec![next];
        }

        Ok(generated)
    }
}

impl CausalModel for CandleModel {
    fn generate(&self, prompt: &[u32], max_new_tokens: usize) -> Result<Vec<u32>, Error> {
        let generated = match &self.weights {
            Weights::Llama { model, config } => {
                let mut cache = Cache::new(true, self.dtype, config, &self.device)
                    .map_err(|e| Error::from_source(ErrorKind::Generation, e))?;

                self.decode_greedy(prompt, max_new_tokens, |input, position| {
                    model.forward(input, position, &mut cache)
                })
            }
            Weights::Qwen2(model) => {
                let mut model = model.clone();
                model.clear_kv_cache();

                self.decode_greedy(prompt, max_new_tokens, |input, position| {
                    model.forward(input, position)
                })
            }
        };

        generated.map_err(|e| Error::from_source(ErrorKind::Generation, e))
    }
}
