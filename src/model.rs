use crate::RgbImage;

/// Trait for models that turn an image into a caption.
///
/// The service and the engine only talk to the model through this trait, so any
/// image-to-text backend can be plugged in.
pub trait CaptionModel {
    /// The error type that can be returned during generation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Generates a caption for the given rgb8 image.
    fn generate(&mut self, image: &RgbImage) -> Result<String, Self::Error>;

    /// A human readable identifier of the loaded model.
    fn name(&self) -> &str;
}
