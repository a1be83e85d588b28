use std::path::Path;

use image::{DynamicImage, ImageReader};
use tracing::{info, instrument};

use crate::error::AcquisitionError;

/// Load and decode the input image.
///
/// A missing file and an undecodable file are reported as distinct errors.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_image(path: impl AsRef<Path>) -> Result<DynamicImage, AcquisitionError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(AcquisitionError::NotFound(path.to_path_buf()));
    }

    let decode_err = |source| AcquisitionError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let image = ImageReader::open(path)
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;

    info!(width = image.width(), height = image.height(), "Image loaded");
    Ok(image)
}
