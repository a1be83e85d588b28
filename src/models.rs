use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Axis-aligned box in image coordinates (origin top-left).
///
/// Two boxes name the same region only when all four fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    /// A box with no extent cannot become a region.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.left as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.top as u64 + self.height as u64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the box lies entirely inside an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Area shared with `other`, zero when they do not overlap.
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let left = self.left.max(other.left) as u64;
        let top = self.top.max(other.top) as u64;
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right <= left || bottom <= top {
            return 0;
        }
        (right - left) * (bottom - top)
    }

    /// Intersection over union, in `0.0..=1.0`.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        inter as f32 / union as f32
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}) {}x{}", self.left, self.top, self.width, self.height)
    }
}

/// Result of classifying one region: recognized text, or an encoded sub-image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_image: bool,
    /// Recognized text, or base64 PNG data when `is_image` is set.
    pub payload: String,
}

impl Classification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_image: false,
            payload: text.into(),
        }
    }

    pub fn image(encoded: impl Into<String>) -> Self {
        Self {
            is_image: true,
            payload: encoded.into(),
        }
    }
}

/// One detected content area plus its eventual classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub bbox: BoundingBox,
    classification: Option<Classification>,
}

impl Region {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            classification: None,
        }
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }

    /// Attach the classification. A region is classified exactly once.
    pub fn classify(&mut self, classification: Classification) -> Result<(), PipelineError> {
        if self.classification.is_some() {
            return Err(PipelineError::AlreadyClassified(self.bbox));
        }
        self.classification = Some(classification);
        Ok(())
    }
}

/// Ordered, index-stable collection of regions for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    regions: Vec<Region>,
}

impl Document {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Position of the first unclassified region, if any.
    pub fn first_unclassified(&self) -> Option<usize> {
        self.regions.iter().position(|r| !r.is_classified())
    }

    /// Flatten the document into wire records, `index` equal to position.
    pub fn records(&self) -> Result<Vec<BlockRecord>, PipelineError> {
        self.regions
            .iter()
            .enumerate()
            .map(|(index, region)| -> Result<BlockRecord, PipelineError> {
                let classification = region
                    .classification()
                    .ok_or(PipelineError::Unclassified { index, bbox: region.bbox })?;
                Ok(BlockRecord::new(index, region.bbox, classification))
            })
            .collect()
    }
}

/// One serialized block. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: usize,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "isImage")]
    pub is_image: bool,
    pub data: String,
}

impl BlockRecord {
    pub fn new(index: usize, bbox: BoundingBox, classification: &Classification) -> Self {
        Self {
            index,
            left: bbox.left,
            top: bbox.top,
            width: bbox.width,
            height: bbox.height,
            is_image: classification.is_image,
            data: classification.payload.clone(),
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.left, self.top, self.width, self.height)
    }
}

impl std::fmt::Display for BlockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_image { "image" } else { "text" };
        write!(
            f,
            "[{}] {} {} {}",
            self.index,
            self.bbox(),
            kind,
            summarize(&self.data, self.is_image)
        )
    }
}

fn summarize(data: &str, is_image: bool) -> String {
    if is_image {
        return format!("<{} bytes encoded>", data.len());
    }
    format!("{:?}", data)
}

/// Connected ink component found by the contour detector.
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }

    /// Bounding box grown by `padding` on every side, clamped to the image.
    pub fn padded_box(&self, padding: u32, img_width: u32, img_height: u32) -> BoundingBox {
        let left = self.min_x.saturating_sub(padding);
        let top = self.min_y.saturating_sub(padding);
        let max_x = (self.max_x + padding).min(img_width.saturating_sub(1));
        let max_y = (self.max_y + padding).min(img_height.saturating_sub(1));

        BoundingBox {
            left,
            top,
            width: max_x - left + 1,
            height: max_y - top + 1,
        }
    }
}
