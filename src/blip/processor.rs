use candle_core::{DType, Device, Tensor};
use kornia_image::{
    Image,
    allocator::{CpuAllocator, ImageAllocator},
};
use kornia_imgproc::{interpolation::InterpolationMode, resize::resize_fast};
use tokenizers::Tokenizer;

use crate::CaptionError;

/// Side of the square image the vision tower expects.
pub const IMAGE_SIZE: usize = 384;

const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Control markers of the BERT vocabulary used by BLIP.
const CONTROL_TOKENS: [&str; 7] = [
    "[CLS]", "[SEP]", "[PAD]", "[UNK]", "[MASK]", "[DEC]", "[ENC]",
];

/// Pre and post processing matched to the BLIP checkpoints.
///
/// Turns rgb8 images into normalized pixel tensors and generated token ids back into text.
pub struct BlipProcessor {
    tokenizer: Tokenizer,
    img_buf: Image<u8, 3, CpuAllocator>,
    mean: Tensor,
    std: Tensor,
}

impl BlipProcessor {
    pub fn new(tokenizer: Tokenizer, device: &Device) -> Result<Self, CaptionError> {
        let img_buf =
            Image::from_size_val([IMAGE_SIZE, IMAGE_SIZE].into(), 0, CpuAllocator)?;
        let mean = Tensor::new(&IMAGE_MEAN, device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&IMAGE_STD, device)?.reshape((3, 1, 1))?;

        Ok(Self {
            tokenizer,
            img_buf,
            mean,
            std,
        })
    }

    /// Convert an rgb8 image into the pixel tensor with shape [3, 384, 384].
    pub fn preprocess<A: ImageAllocator>(
        &mut self,
        image: &Image<u8, 3, A>,
    ) -> Result<Tensor, CaptionError> {
        resize_fast(image, &mut self.img_buf, InterpolationMode::Bilinear)?;

        let pixels = Tensor::from_raw_buffer(
            self.img_buf.as_slice(),
            DType::U8,
            &[self.img_buf.rows(), self.img_buf.cols(), 3],
            self.mean.device(),
        )?
        .to_dtype(DType::F32)?
        .permute((2, 0, 1))?
        .affine(1. / 255., 0.)?
        .broadcast_sub(&self.mean)?
        .broadcast_div(&self.std)?;

        Ok(pixels)
    }

    /// Decode generated token ids into a caption without control markers.
    pub fn decode(&self, ids: &[u32]) -> Result<String, CaptionError> {
        let text = self.tokenizer.decode(ids, true)?;
        Ok(strip_control_tokens(&text))
    }
}

/// Remove control markers left over by the tokenizer and normalize whitespace.
pub fn strip_control_tokens(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            CONTROL_TOKENS
                .iter()
                .fold(word.to_string(), |w, marker| w.replace(marker, ""))
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
