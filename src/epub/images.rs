use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;

use super::resize::{exceeds, resize_to_fit};
use crate::error::{Error, Result};
use crate::models::Chapter;

/// A processed image ready to be stored in the output package.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// Turns an image reference found in chapter HTML into an embeddable image.
pub trait ImageSource {
    fn embed(&mut self, reference: &str) -> Result<EmbeddedImage>;
}

/// Images of all chapters of one assembly, keyed by reference name.
///
/// Built as a plain union in chapter order: when two chapters use the same
/// reference name, the later chapter's bytes serve both references.
pub struct ImageTable {
    raw: HashMap<String, Vec<u8>>,
    frame: (u32, u32),
    embedded: HashMap<String, EmbeddedImage>,
}

impl ImageTable {
    pub fn from_chapters<'a>(chapters: impl IntoIterator<Item = &'a Chapter>, frame: (u32, u32)) -> Self {
        let mut raw = HashMap::new();
        for chapter in chapters {
            for (name, bytes) in &chapter.images {
                raw.insert(name.clone(), bytes.clone());
            }
        }
        Self {
            raw,
            frame,
            embedded: HashMap::new(),
        }
    }

    pub fn raw(&self, reference: &str) -> Option<&[u8]> {
        self.raw.get(reference).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn process(&self, reference: &str) -> Result<EmbeddedImage> {
        let bytes = self
            .raw(reference)
            .ok_or_else(|| Error::MissingImage(reference.to_string()))?;

        let mut decoded = image::load_from_memory(bytes)?;
        if exceeds((decoded.width(), decoded.height()), self.frame) {
            decoded = resize_to_fit(&decoded, self.frame);
        }

        let mut encoded = Vec::new();
        decoded.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

        Ok(EmbeddedImage {
            file_name: format!("image_{:04}.png", self.embedded.len() + 1),
            width: decoded.width(),
            height: decoded.height(),
            data: encoded.into(),
        })
    }
}

impl ImageSource for ImageTable {
    /// Each reference is decoded once; later uses share the first result.
    fn embed(&mut self, reference: &str) -> Result<EmbeddedImage> {
        if let Some(image) = self.embedded.get(reference) {
            return Ok(image.clone());
        }
        let image = self.process(reference)?;
        tracing::debug!(reference, file = %image.file_name, width = image.width, height = image.height, "image embedded");
        self.embedded.insert(reference.to_string(), image.clone());
        Ok(image)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([30, 60, 90])));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn chapter_with(name: &str, bytes: Vec<u8>) -> Chapter {
        Chapter::builder().image(name, bytes).build()
    }

    #[test]
    fn later_chapter_wins_shared_reference() {
        let first = chapter_with("a.png", png(10, 10));
        let second = chapter_with("a.png", png(20, 10));
        let mut table = ImageTable::from_chapters([&first, &second], (550, 500));

        assert_eq!(table.len(), 1);
        assert_eq!(table.raw("a.png").unwrap(), png(20, 10).as_slice());
        let embedded = table.embed("a.png").unwrap();
        assert_eq!((embedded.width, embedded.height), (20, 10));
    }

    #[test]
    fn oversized_images_are_shrunk_small_ones_kept() {
        let chapter = Chapter::builder()
            .image("big.png", png(1100, 250))
            .image("small.png", png(40, 30))
            .build();
        let mut table = ImageTable::from_chapters([&chapter], (550, 500));

        let big = table.embed("big.png").unwrap();
        assert_eq!((big.width, big.height), (550, 125));
        let small = table.embed("small.png").unwrap();
        assert_eq!((small.width, small.height), (40, 30));
        assert_ne!(big.file_name, small.file_name);
    }

    #[test]
    fn repeated_reference_reuses_embedding() {
        let chapter = chapter_with("a.png", png(5, 5));
        let mut table = ImageTable::from_chapters([&chapter], (550, 500));
        let first = table.embed("a.png").unwrap();
        let again = table.embed("a.png").unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn unknown_reference_is_fatal() {
        let mut table = ImageTable::from_chapters(std::iter::empty::<&Chapter>(), (550, 500));
        assert!(matches!(table.embed("nope.png"), Err(Error::MissingImage(name)) if name == "nope.png"));
    }

    #[test]
    fn corrupt_bytes_fail_decoding() {
        let chapter = chapter_with("bad.png", b"definitely not an image".to_vec());
        let mut table = ImageTable::from_chapters([&chapter], (550, 500));
        assert!(matches!(table.embed("bad.png"), Err(Error::Image(_))));
    }
}
