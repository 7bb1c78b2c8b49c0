use image::DynamicImage;
use image::imageops::FilterType;

/// Scales `image` uniformly so it fits inside `bounds` (width, height).
///
/// The smaller of the two axis scale factors is used, so nothing is cropped.
/// Sizes are rounded down but never reach zero. Catmull-Rom is the bicubic
/// filter of the `image` crate.
pub fn resize_to_fit(image: &DynamicImage, bounds: (u32, u32)) -> DynamicImage {
    let (width, height) = fitted_size((image.width(), image.height()), bounds);
    image.resize_exact(width, height, FilterType::CatmullRom)
}

/// Target size for `source` inside `bounds`, preserving the aspect ratio.
pub fn fitted_size(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (source_width, source_height) = source;
    if source_width == 0 || source_height == 0 {
        return source;
    }

    let (width, height) = (u64::from(source_width), u64::from(source_height));
    let (max_width, max_height) = (u64::from(bounds.0), u64::from(bounds.1));

    // max_width / width <= max_height / height, cross-multiplied to stay exact.
    let (width, height) = if max_width * height <= max_height * width {
        (max_width, height * max_width / width)
    } else {
        (width * max_height / height, max_height)
    };
    let width = (width as u32).max(1);
    let height = (height as u32).max(1);
    (width, height)
}

/// Whether `source` is larger than `bounds` on either axis.
pub fn exceeds(source: (u32, u32), bounds: (u32, u32)) -> bool {
    source.0 > bounds.0 || source.1 > bounds.1
}
