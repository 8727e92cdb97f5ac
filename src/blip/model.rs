use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip::BlipForConditionalGeneration;

use crate::CaptionError;

/// Token that starts every caption (`[DEC]`).
pub const BOS_TOKEN_ID: u32 = 30522;
/// Token that ends a caption (`[SEP]`).
pub const SEP_TOKEN_ID: u32 = 102;

pub struct CaptionGeneratorConfig {
    pub seed: u64,
    pub max_length: usize,
}

/// Greedy autoregressive decoding on top of the BLIP text decoder.
pub struct CaptionGenerator {
    model: BlipForConditionalGeneration,
    device: Device,
    logits_processor: LogitsProcessor,
    max_length: usize,
}

impl CaptionGenerator {
    pub fn new(
        model: BlipForConditionalGeneration,
        device: Device,
        config: CaptionGeneratorConfig,
    ) -> Self {
        // no temperature means argmax sampling, so captions are deterministic
        let logits_processor = LogitsProcessor::new(config.seed, None, None);
        Self {
            model,
            device,
            logits_processor,
            max_length: config.max_length,
        }
    }

    /// Generate the caption token ids for a pixel tensor with shape [3, H, W].
    ///
    /// The returned ids exclude the leading `[DEC]` and the trailing `[SEP]`. The sequence,
    /// bos token included, never grows past `max_length`.
    pub fn run(&mut self, pixels: &Tensor) -> Result<Vec<u32>, CaptionError> {
        self.model.reset_kv_cache();

        let image_embeds = pixels
            .to_device(&self.device)?
            .unsqueeze(0)?
            .apply(self.model.vision_model())?;

        let start_gen = std::time::Instant::now();
        let mut tokens = vec![BOS_TOKEN_ID];
        while tokens.len() < self.max_length {
            let context_size = if tokens.len() > 1 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = self
                .model
                .text_decoder()
                .forward(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;

            let next_token = self.logits_processor.sample(&logits)?;
            if next_token == SEP_TOKEN_ID {
                break;
            }
            tokens.push(next_token);
        }

        let generated = tokens.len() - 1;
        let dt = start_gen.elapsed();
        log::debug!(
            "{generated} tokens generated ({:.2} token/s)",
            generated as f64 / dt.as_secs_f64(),
        );

        tokens.remove(0);
        Ok(tokens)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarBuilder;
    use candle_transformers::models::blip;

    // a few kilobytes of zero weights with the real vocabulary size
    fn tiny_generator(max_length: usize) -> Result<CaptionGenerator, CaptionError> {
        let mut config = blip::Config::image_captioning_large();
        config.vision_config.hidden_size = 32;
        config.vision_config.intermediate_size = 64;
        config.vision_config.num_hidden_layers = 1;
        config.vision_config.num_attention_heads = 2;
        config.vision_config.image_size = 32;
        config.vision_config.patch_size = 16;
        config.text_config.hidden_size = 32;
        config.text_config.encoder_hidden_size = 32;
        config.text_config.intermediate_size = 64;
        config.text_config.num_hidden_layers = 1;
        config.text_config.num_attention_heads = 2;

        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let model = BlipForConditionalGeneration::new(&config, vb)?;

        Ok(CaptionGenerator::new(
            model,
            Device::Cpu,
            CaptionGeneratorConfig {
                seed: 299792458,
                max_length,
            },
        ))
    }

    fn pixels() -> Result<Tensor, CaptionError> {
        Ok(Tensor::zeros((3, 32, 32), DType::F32, &Device::Cpu)?)
    }

    // uniform logits never select [SEP], so generation runs until the length ceiling
    #[test]
    fn stops_at_max_length() -> Result<(), CaptionError> {
        for max_length in [2, 5, 50] {
            let ids = tiny_generator(max_length)?.run(&pixels()?)?;
            assert_eq!(ids.len(), max_length - 1);
            assert!(!ids.contains(&BOS_TOKEN_ID));
            assert!(!ids.contains(&SEP_TOKEN_ID));
        }
        Ok(())
    }

    #[test]
    fn repeated_runs_match() -> Result<(), CaptionError> {
        let mut generator = tiny_generator(8)?;
        let pixels = pixels()?;

        let first = generator.run(&pixels)?;
        let second = generator.run(&pixels)?;
        assert_eq!(first, second);

        Ok(())
    }
}
