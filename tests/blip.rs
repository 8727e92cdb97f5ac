//! Captioning with the real BLIP weights.
//!
//! These tests download the checkpoint from the Hugging Face hub, run them with
//! `cargo test -- --ignored`.

use kornia_caption::{
    Blip, BlipConfig, CaptionError, CaptionOutcome, CaptionService, ModelSource,
    input::rgb_from_dynamic,
};

fn service() -> CaptionService<Blip> {
    let model = Blip::new(BlipConfig {
        force_cpu: true,
        ..Default::default()
    })
    .expect("the default checkpoint should load");
    CaptionService::new(model)
}

fn assert_clean_caption(outcome: &CaptionOutcome) {
    let CaptionOutcome::Caption(text) = outcome else {
        panic!("expected a caption, got {outcome:?}");
    };
    assert!(!text.is_empty());
    for marker in ["[CLS]", "[SEP]", "[PAD]", "[DEC]", "[UNK]"] {
        assert!(!text.contains(marker), "{text:?} contains {marker}");
    }
}

#[test]
#[ignore = "downloads the BLIP checkpoint"]
fn solid_red_image() -> Result<(), CaptionError> {
    let red = image::RgbImage::from_pixel(100, 100, image::Rgb([255, 0, 0]));
    let image = rgb_from_dynamic(image::DynamicImage::ImageRgb8(red))?;

    let service = service();
    let first = service.caption(&image);
    assert_clean_caption(&first);

    // greedy decoding with a fresh cache every call
    assert_eq!(service.caption(&image), first);

    Ok(())
}

#[test]
#[ignore = "downloads the BLIP checkpoint"]
fn grayscale_image() -> Result<(), CaptionError> {
    let gray = image::GrayImage::from_fn(64, 48, |x, _| image::Luma([(x * 4) as u8]));
    let image = rgb_from_dynamic(image::DynamicImage::ImageLuma8(gray))?;

    assert_clean_caption(&service().caption(&image));

    Ok(())
}

#[test]
#[ignore = "queries the Hugging Face hub"]
fn unknown_model_fails_to_load() {
    let res = Blip::new(BlipConfig {
        source: ModelSource::Hub {
            model_id: "kornia/this-model-does-not-exist".to_string(),
            revision: "main".to_string(),
        },
        force_cpu: true,
        ..Default::default()
    });
    assert!(matches!(res, Err(CaptionError::FailedToLoadModel(_))));
}
