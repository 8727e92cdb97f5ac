mod model;
mod processor;

pub use model::{BOS_TOKEN_ID, SEP_TOKEN_ID};
pub use processor::{BlipProcessor, IMAGE_SIZE, strip_control_tokens};

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::blip::{self, BlipForConditionalGeneration};
use hf_hub::{Repo, RepoType, api::sync::Api};
use model::{CaptionGenerator, CaptionGeneratorConfig};
use tokenizers::Tokenizer;

use crate::{CaptionError, CaptionModel, RgbImage, device::select_device};

/// The checkpoint loaded when nothing else is requested.
pub const DEFAULT_MODEL_ID: &str = "Salesforce/blip-image-captioning-base";
/// Maximum caption length in tokens, the leading bos token included.
pub const DEFAULT_MAX_LENGTH: usize = 50;

const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Where the BLIP weights and tokenizer come from.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelSource {
    /// A repository on the Hugging Face hub, downloaded into the local hub cache.
    Hub { model_id: String, revision: String },
    /// A directory holding `tokenizer.json` and `model.safetensors`.
    Local(PathBuf),
}

impl ModelSource {
    /// The name used to pick the architecture preset and to report the model.
    pub fn name(&self) -> String {
        match self {
            ModelSource::Hub { model_id, .. } => model_id.clone(),
            ModelSource::Local(dir) => dir.display().to_string(),
        }
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        ModelSource::Hub {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
        }
    }
}

/// Configuration for the BLIP captioning model
pub struct BlipConfig {
    pub source: ModelSource,
    pub max_length: usize,
    pub seed: u64,
    pub force_cpu: bool,
}

impl Default for BlipConfig {
    fn default() -> Self {
        Self {
            source: ModelSource::default(),
            max_length: DEFAULT_MAX_LENGTH,
            seed: 299792458,
            force_cpu: false,
        }
    }
}

/// Architecture hyper-parameters matching the checkpoint name.
///
/// `large` checkpoints use the 24-layer ViT-L vision tower, everything else the 12-layer
/// ViT-B one.
pub fn architecture_for(name: &str) -> blip::Config {
    let mut config = blip::Config::image_captioning_large();
    if !name.contains("large") {
        config.vision_config.hidden_size = 768;
        config.vision_config.intermediate_size = 3072;
        config.vision_config.num_hidden_layers = 12;
        config.vision_config.num_attention_heads = 12;
        config.text_config.encoder_hidden_size = 768;
    }
    config
}

/// The BLIP image captioning model
///
/// Holds the Salesforce BLIP encoder-decoder together with its processor and generates a
/// short caption for an image.
///
/// NOTE: to run the model on a GPU, pass `--features cuda` or `--features metal` to cargo.
pub struct Blip {
    name: String,
    processor: BlipProcessor,
    generator: CaptionGenerator,
}

impl Blip {
    /// Load the model and its processor.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the BLIP model
    ///
    /// # Errors
    ///
    /// Fails when `max_length` is below 2, or when the weights or the tokenizer cannot be
    /// fetched or do not match the architecture.
    pub fn new(config: BlipConfig) -> Result<Self, CaptionError> {
        // room for the bos token plus at least one generated token
        if config.max_length < 2 {
            return Err(CaptionError::InvalidConfig(format!(
                "max_length must be at least 2, got {}",
                config.max_length
            )));
        }

        let device = select_device(config.force_cpu);
        let name = config.source.name();

        log::info!("Loading {name}");
        let (tokenizer_file, weights_file) = Self::fetch_files(&config.source)?;

        let tokenizer = Tokenizer::from_file(tokenizer_file)?;
        let processor = BlipProcessor::new(tokenizer, &device)?;

        let model = Self::load_model(&name, &weights_file, &device)?;
        let generator = CaptionGenerator::new(
            model,
            device,
            CaptionGeneratorConfig {
                seed: config.seed,
                max_length: config.max_length,
            },
        );
        log::info!("Model and processor loaded successfully");

        Ok(Self {
            name,
            processor,
            generator,
        })
    }

    /// Run the inference of the BLIP model
    ///
    /// # Arguments
    ///
    /// * `image` - The rgb8 image to generate a caption for with shape [H, W, 3]
    ///
    /// # Returns
    ///
    /// * `caption` - The generated caption, without control tokens
    pub fn inference(&mut self, image: &RgbImage) -> Result<String, CaptionError> {
        let pixels = self.processor.preprocess(image)?;
        let ids = self.generator.run(&pixels)?;
        self.processor.decode(&ids)
    }

    fn fetch_files(source: &ModelSource) -> Result<(PathBuf, PathBuf), CaptionError> {
        match source {
            ModelSource::Hub { model_id, revision } => {
                let api = Api::new()?;
                let repo = api.repo(Repo::with_revision(
                    model_id.clone(),
                    RepoType::Model,
                    revision.clone(),
                ));
                Ok((repo.get(TOKENIZER_FILE)?, repo.get(WEIGHTS_FILE)?))
            }
            ModelSource::Local(dir) => Ok((
                local_file(dir, TOKENIZER_FILE)?,
                local_file(dir, WEIGHTS_FILE)?,
            )),
        }
    }

    // utility function to build the model from the safetensors weights
    fn load_model(
        name: &str,
        weights_file: &Path,
        device: &Device,
    ) -> Result<BlipForConditionalGeneration, CaptionError> {
        let config = architecture_for(name);
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], DType::F32, device)? };
        let model = BlipForConditionalGeneration::new(&config, vb)?;
        Ok(model)
    }
}

fn local_file(dir: &Path, name: &str) -> Result<PathBuf, CaptionError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(CaptionError::MissingModelFile(path.display().to_string()));
    }
    Ok(path)
}

impl CaptionModel for Blip {
    type Error = CaptionError;

    fn generate(&mut self, image: &RgbImage) -> Result<String, Self::Error> {
        self.inference(image)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
