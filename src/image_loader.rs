use std::path::Path;

use crate::error::{Error, Result};

pub const BYTES_PER_PIXEL: usize = 4;

/// Decoded image as tightly packed RGBA8 rows, top row first.
#[derive(Debug, Clone)]
pub struct RgbaPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaPixels {
    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        &self.data[y * stride..(y + 1) * stride]
    }
}

pub fn load_rgba<P: AsRef<Path>>(path: P) -> Result<RgbaPixels> {
    let path = path.as_ref();
    let img = image::open(path)
        .map_err(|source| Error::ImageLoad {
            path: path.to_owned(),
            source,
        })?
        .to_rgba();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage(path.to_owned()));
    }
    log::debug!("decoded {} ({}x{})", path.display(), width, height);

    Ok(RgbaPixels {
        width,
        height,
        data: img.into_raw(),
    })
}
