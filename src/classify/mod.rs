pub mod ocr;

use std::collections::HashMap;
use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat};

use crate::error::ClassifyError;
use crate::models::{BoundingBox, Classification};

pub use ocr::{OcrClassifier, OcrConfig, OcrsRecognizer, TextRecognizer};

/// Decides whether a region holds text or an embedded image.
pub trait Classifier: Send + Sync {
    fn classify(&self, bbox: &BoundingBox, image: &DynamicImage) -> Result<Classification, ClassifyError>;

    fn name(&self) -> &str;
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&self, bbox: &BoundingBox, image: &DynamicImage) -> Result<Classification, ClassifyError> {
        (**self).classify(bbox, image)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Pixels of `bbox`: rows `top..top+height`, columns `left..left+width`.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage, ClassifyError> {
    if bbox.is_degenerate() {
        return Err(ClassifyError::Degenerate(*bbox));
    }
    if !bbox.fits_within(image.width(), image.height()) {
        return Err(ClassifyError::OutOfBounds {
            bbox: *bbox,
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image.crop_imm(bbox.left, bbox.top, bbox.width, bbox.height))
}

/// PNG-encode an image and return it as standard base64.
pub fn encode_png_base64(image: &DynamicImage) -> Result<String, ClassifyError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(BASE64.encode(buffer.into_inner()))
}

/// Every region becomes an embedded image.
pub struct ImageClassifier;

impl Classifier for ImageClassifier {
    fn classify(&self, bbox: &BoundingBox, image: &DynamicImage) -> Result<Classification, ClassifyError> {
        let region = crop(image, bbox)?;
        Ok(Classification::image(encode_png_base64(&region)?))
    }

    fn name(&self) -> &str {
        "image"
    }
}

/// Canned answers keyed by exact box. Unknown boxes are a
/// [`ClassifyError::NoMatch`].
#[derive(Debug, Clone, Default)]
pub struct LookupClassifier {
    table: HashMap<BoundingBox, Classification>,
}

impl LookupClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bbox: BoundingBox, classification: Classification) -> Self {
        self.table.insert(bbox, classification);
        self
    }
}

impl FromIterator<(BoundingBox, Classification)> for LookupClassifier {
    fn from_iter<I: IntoIterator<Item = (BoundingBox, Classification)>>(iter: I) -> Self {
        Self {
            table: iter.into_iter().collect(),
        }
    }
}

impl Classifier for LookupClassifier {
    fn classify(&self, bbox: &BoundingBox, _image: &DynamicImage) -> Result<Classification, ClassifyError> {
        self.table.get(bbox).cloned().ok_or(ClassifyError::NoMatch(*bbox))
    }

    fn name(&self) -> &str {
        "lookup"
    }
}
