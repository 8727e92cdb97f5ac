/// Errors raised while loading the captioning model or preparing its inputs.
#[derive(thiserror::Error, Debug)]
pub enum CaptionError {
    #[error(transparent)]
    FailedToLoadModel(#[from] hf_hub::api::sync::ApiError),

    #[error(transparent)]
    CandleError(#[from] candle_core::Error),

    #[error(transparent)]
    ImageError(#[from] kornia_image::ImageError),

    #[error(transparent)]
    TokenizerError(#[from] tokenizers::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// The supplied value could not be interpreted as an image.
    #[error("Invalid input kind: {0}")]
    InvalidInputKind(String),

    /// A local model directory lacks the tokenizer or the weights.
    #[error("Model file not found: {0}")]
    MissingModelFile(String),

    /// The model configuration cannot produce a caption.
    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),
}
