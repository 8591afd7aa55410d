use image::imageops::FilterType;
use image::DynamicImage;

/// Largest size with the source aspect ratio that fits inside `max_w × max_h`.
///
/// Never upscales: a source already inside the bounds is returned unchanged.
/// Each side is rounded to the nearest pixel and is at least 1.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width.max(1), height.max(1));
    }
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_width.max(1));
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_height.max(1));
    (w, h)
}

/// Round down to an even number, minimum 2 (H.264 requires even dimensions).
pub fn even(value: u32) -> u32 {
    (value - value % 2).max(2)
}

/// Resize to exact dimensions with the high-quality Lanczos kernel.
pub fn resize_to(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.width() == width && img.height() == height {
        return img.clone();
    }
    img.resize_exact(width, height, FilterType::Lanczos3)
}
