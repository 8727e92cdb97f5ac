use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Mutex, PoisonError},
};

use crate::{CaptionModel, RgbImage};

/// Result of captioning one image.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptionOutcome {
    /// The generated caption.
    Caption(String),
    /// Generation failed; holds the reason for the operator, not for end users.
    Failed(String),
}

impl CaptionOutcome {
    pub fn is_caption(&self) -> bool {
        matches!(self, CaptionOutcome::Caption(_))
    }

    /// Returns the caption, or `fallback` when generation failed.
    pub fn text_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            CaptionOutcome::Caption(text) => text,
            CaptionOutcome::Failed(_) => fallback,
        }
    }
}

/// Process-wide captioning service.
///
/// Built once at startup around a loaded model and shared by reference afterwards. Every
/// call is isolated: a failing caption is reported as [`CaptionOutcome::Failed`] and leaves
/// the service usable for the next request.
pub struct CaptionService<M: CaptionModel> {
    name: String,
    model: Mutex<M>,
}

impl<M: CaptionModel> CaptionService<M> {
    pub fn new(model: M) -> Self {
        Self {
            name: model.name().to_string(),
            model: Mutex::new(model),
        }
    }

    /// Name of the model behind the service.
    pub fn model_name(&self) -> &str {
        &self.name
    }

    /// Generate a caption for an rgb8 image.
    ///
    /// Blocks until the model finished. Concurrent callers are served one at a time.
    pub fn caption(&self, image: &RgbImage) -> CaptionOutcome {
        // models start every generation from a clean state, a poisoned lock is safe to reuse
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);

        let generated = panic::catch_unwind(AssertUnwindSafe(|| model.generate(image)));
        let generated = match generated {
            Ok(generated) => generated,
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                log::error!("Caption generation panicked: {reason}");
                return CaptionOutcome::Failed(format!("caption generation panicked: {reason}"));
            }
        };

        match generated {
            Ok(caption) if caption.trim().is_empty() => {
                log::error!("Error during caption generation: empty caption");
                CaptionOutcome::Failed("the model produced an empty caption".to_string())
            }
            Ok(caption) => CaptionOutcome::Caption(caption.trim().to_string()),
            Err(e) => {
                log::error!("Error during caption generation: {e}");
                CaptionOutcome::Failed(e.to_string())
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason
    } else {
        "unknown panic"
    }
}
