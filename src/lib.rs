//! # Kornia Caption
//!
//! Image captioning on top of the pretrained Salesforce BLIP encoder-decoder.
//!
//! The crate is split in three layers:
//!
//! - [`CaptionService`]: owns the loaded model and turns an rgb8 image into a
//!   [`CaptionOutcome`].
//! - [`CaptionEngine`]: runs the service on a dedicated inference thread and keeps
//!   per-request telemetry.
//! - `server` (feature `server`): the browser upload-and-caption page.
//!
//! ```no_run
//! use kornia_caption::{Blip, BlipConfig, CaptionService, input::read_image};
//!
//! let service = CaptionService::new(Blip::new(BlipConfig::default())?);
//! let outcome = service.caption(&read_image("cat.jpg")?);
//! println!("{}", outcome.text_or("no caption"));
//! # Ok::<(), kornia_caption::CaptionError>(())
//! ```

use kornia_image::{Image, allocator::CpuAllocator};

/// BLIP model loading, preprocessing and generation.
pub mod blip;

/// Compute device selection.
pub mod device;

/// Threaded request scheduling around the service.
pub mod engine;

/// Decoding of encoded images into rgb8 bitmaps.
pub mod input;

/// Browser user interface.
#[cfg(feature = "server")]
pub mod server;

mod error;
mod model;
mod service;

pub use blip::{Blip, BlipConfig, ModelSource};
pub use engine::{CaptionEngine, CaptionResponse, CaptionTicket, EngineError, EngineState};
pub use error::CaptionError;
pub use model::CaptionModel;
pub use service::{CaptionOutcome, CaptionService};

/// The image type accepted by the captioning models.
pub type RgbImage = Image<u8, 3, CpuAllocator>;
