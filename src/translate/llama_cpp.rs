//! llama.cpp runtime for [`LlamaCppTranslator`](super::LlamaCppTranslator).
//!
//! Compiled only with the `llama-cpp` feature. GPU offload additionally needs
//! the `cuda` feature and, on Windows, the accelerator bootstrap to have run
//! before the first model is loaded.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::OnceLock;

use encoding_rs::{CoderResult, Decoder, UTF_8};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use tracing::{debug, warn};

use crate::error::{Result, YakushaError};
use super::common::{ChatMessage, GenerationParams, ModelParams};
use super::llama::{ChatModel, ModelLoader};

// llama.cpp refuses a second backend initialization in the same process
static BACKEND: OnceLock<LlamaBackend> = OnceLock::new();

fn backend() -> Result<&'static LlamaBackend> {
    if let Some(backend) = BACKEND.get() {
        return Ok(backend);
    }
    let mut backend = LlamaBackend::init()
        .map_err(|e| YakushaError::ModelLoad(format!("llama backend init: {}", e)))?;
    backend.void_logs();
    Ok(BACKEND.get_or_init(|| backend))
}

/// Loads GGUF files with llama.cpp
pub struct LlamaCppLoader;

impl ModelLoader for LlamaCppLoader {
    fn load(&self, path: &Path, params: &ModelParams) -> Result<Box<dyn ChatModel>> {
        let backend = backend()?;

        let mut model_params = LlamaModelParams::default();
        if params.n_gpu_layers < 0 {
            // llama.cpp clamps counts above n_layer to "all layers"
            model_params = model_params.with_n_gpu_layers(9999);
        } else {
            model_params = model_params.with_n_gpu_layers(params.n_gpu_layers as u32);
        }

        let model = LlamaModel::load_from_file(backend, path, &model_params)
            .map_err(|e| YakushaError::ModelLoad(format!("load model {}: {}", path.display(), e)))?;

        let template = match model.chat_template(None) {
            Ok(template) => template,
            Err(e) => {
                warn!(error = %e, "model has no chat template, falling back to chatml");
                LlamaChatTemplate::new("chatml")
                    .map_err(|e| YakushaError::ModelLoad(format!("chat template: {}", e)))?
            }
        };

        Ok(Box::new(LlamaCppModel {
            backend,
            model,
            template,
            n_ctx: params.n_ctx,
        }))
    }
}

/// A loaded model. A fresh context is created per completion so the
/// KV cache never leaks between text units.
pub struct LlamaCppModel {
    backend: &'static LlamaBackend,
    model: LlamaModel,
    template: LlamaChatTemplate,
    n_ctx: u32,
}

impl LlamaCppModel {
    fn render_prompt(&self, messages: &[ChatMessage]) -> Result<String> {
        let chat = messages
            .iter()
            .map(|m| {
                LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone())
                    .map_err(|e| YakushaError::Generation(format!("build chat message: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        self.model
            .apply_chat_template(&self.template, &chat, true)
            .map_err(|e| YakushaError::Generation(format!("apply chat template: {}", e)))
    }
}

impl ChatModel for LlamaCppModel {
    fn create_chat_completion(
        &mut self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String> {
        let prompt = self.render_prompt(messages)?;

        let tokens = self
            .model
            .str_to_token(&prompt, AddBos::Always)
            .map_err(|e| YakushaError::Generation(format!("tokenize prompt: {}", e)))?;
        if tokens.is_empty() {
            return Err(YakushaError::Generation("empty prompt tokens".to_string()));
        }

        let ctx_params = LlamaContextParams::default().with_n_ctx(NonZeroU32::new(self.n_ctx));
        let mut ctx = self
            .model
            .new_context(self.backend, ctx_params)
            .map_err(|e| YakushaError::Generation(format!("create context: {}", e)))?;

        let n_ctx = ctx.n_ctx() as usize;
        let available = n_ctx.saturating_sub(tokens.len() + 1);
        if available == 0 {
            return Err(YakushaError::Generation(format!(
                "prompt too long: {} tokens for a {} token context",
                tokens.len(),
                n_ctx
            )));
        }
        let max_tokens = (params.max_tokens as usize).min(available);

        let n_batch = (ctx.n_batch() as usize).max(1);
        let last_index = tokens.len() - 1;
        for (chunk_index, chunk) in tokens.chunks(n_batch).enumerate() {
            let mut batch = LlamaBatch::new(chunk.len(), 1);
            for (i, token) in chunk.iter().copied().enumerate() {
                let pos = chunk_index * n_batch + i;
                batch
                    .add(token, pos as i32, &[0], pos == last_index)
                    .map_err(|e| YakushaError::Generation(format!("batch prompt: {}", e)))?;
            }
            ctx.decode(&mut batch)
                .map_err(|e| YakushaError::Generation(format!("decode prompt: {}", e)))?;
        }

        let mut sampler = if params.temperature <= 0.0 {
            LlamaSampler::greedy()
        } else {
            LlamaSampler::chain_simple([
                LlamaSampler::temp(params.temperature),
                LlamaSampler::dist(1234),
            ])
        };

        let mut decoder = UTF_8.new_decoder();
        let mut output = String::new();
        let mut batch = LlamaBatch::new(1, 1);
        let mut n_cur = tokens.len() as i32;

        for _ in 0..max_tokens {
            let token = sampler.sample(&ctx, -1);
            if self.model.is_eog_token(token) {
                break;
            }

            let bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| YakushaError::Generation(format!("detokenize: {}", e)))?;
            output.push_str(&decode_piece(&mut decoder, &bytes, false)?);

            if let Some(cut) = find_stop(&output, &params.stop) {
                output.truncate(cut);
                debug!(tokens = n_cur as usize - tokens.len(), "stop sequence reached");
                return Ok(output);
            }

            batch.clear();
            batch
                .add(token, n_cur, &[0], true)
                .map_err(|e| YakushaError::Generation(format!("batch token: {}", e)))?;
            n_cur += 1;
            ctx.decode(&mut batch)
                .map_err(|e| YakushaError::Generation(format!("decode token: {}", e)))?;
        }

        output.push_str(&decode_piece(&mut decoder, &[], true)?);

        if let Some(cut) = find_stop(&output, &params.stop) {
            output.truncate(cut);
        }
        Ok(output)
    }
}

/// Decodes one token's bytes, carrying split UTF-8 sequences over to the
/// next call. `last` flushes any pending partial sequence as U+FFFD.
fn decode_piece(decoder: &mut Decoder, bytes: &[u8], last: bool) -> Result<String> {
    let capacity = decoder
        .max_utf8_buffer_length(bytes.len())
        .ok_or_else(|| YakushaError::Generation("token piece too large to decode".to_string()))?;
    let mut piece = String::with_capacity(capacity);
    let (result, read, _) = decoder.decode_to_string(bytes, &mut piece, last);
    if result != CoderResult::InputEmpty || read != bytes.len() {
        return Err(YakushaError::Generation(format!(
            "token piece decoded {} of {} bytes",
            read,
            bytes.len()
        )));
    }
    Ok(piece)
}

/// Byte offset of the earliest stop sequence in `text`
fn find_stop(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_stop_earliest() {
        let stops = vec!["\n".to_string(), "Japanese:".to_string()];
        assert_eq!(find_stop("Olá Japanese: x\n", &stops), Some(5));
        assert_eq!(find_stop("Olá\nJapanese:", &stops), Some(4));
        assert_eq!(find_stop("Olá", &stops), None);
        assert_eq!(find_stop("Olá", &[String::new()]), None);
    }

    #[test]
    fn test_decode_piece_keeps_long_pieces() {
        let text = "สวัสดีครับสวัสดีครับ";
        assert!(text.len() > 32);

        let mut decoder = UTF_8.new_decoder();
        assert_eq!(decode_piece(&mut decoder, text.as_bytes(), false).unwrap(), text);
        assert_eq!(decode_piece(&mut decoder, &[], true).unwrap(), "");
    }

    #[test]
    fn test_decode_piece_joins_split_sequences() {
        let bytes = "こんにちは".as_bytes();
        let mut decoder = UTF_8.new_decoder();

        let head = decode_piece(&mut decoder, &bytes[..4], false).unwrap();
        let rest = decode_piece(&mut decoder, &bytes[4..], false).unwrap();
        assert_eq!(head, "こ");
        assert_eq!(format!("{}{}", head, rest), "こんにちは");
    }

    #[test]
    fn test_decode_piece_flushes_partial_tail() {
        let mut decoder = UTF_8.new_decoder();
        assert_eq!(decode_piece(&mut decoder, &"こ".as_bytes()[..2], false).unwrap(), "");
        assert_eq!(decode_piece(&mut decoder, &[], true).unwrap(), "\u{FFFD}");
    }
}
