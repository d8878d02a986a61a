use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;

use crate::models::scan::ImageFormat;

/// Capture-side image transform applied between decode and storage.
pub type Preprocess = Box<dyn Fn(DynamicImage) -> DynamicImage + Send + Sync>;

/// Default hook: shrink anything wider than `max_width`, preserving aspect
/// ratio. No grayscale, contrast, blur, or threshold passes; those distort
/// the OCR input more than they help.
pub fn resize_max_width(max_width: u32) -> Preprocess {
    Box::new(move |img| {
        if img.width() <= max_width {
            return img;
        }
        let height =
            ((img.height() as u64 * max_width as u64) / img.width() as u64).max(1) as u32;
        img.resize_exact(max_width, height, FilterType::Triangle)
    })
}

/// Run `hook` over `data` and re-encode in the declared format.
/// Returns `None` when the payload does not parse as an image, in which case
/// the caller stores the raw bytes unchanged.
pub(crate) fn apply(hook: &Preprocess, data: &[u8], format: ImageFormat) -> Option<Vec<u8>> {
    let img = image::load_from_memory(data).ok()?;
    let out = hook(img);
    let mut buf = Cursor::new(Vec::new());
    out.write_to(&mut buf, format.encode_format()).ok()?;
    Some(buf.into_inner())
}
