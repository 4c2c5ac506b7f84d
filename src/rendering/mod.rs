//! TeX -> SVG -> PNG pipeline

pub mod raster;
pub mod typeset;

use crate::error::Result;
use raster::{RasterOptions, Rasterizer, Sizing};
use typeset::Typesetter;

/// A rendered PNG together with its pixel size
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub width: u32,
    pub height: u32,
    pub png_data: Vec<u8>,
}

/// The render pipeline: a typesetter followed by a rasterizer.
///
/// Build one at startup and share it (e.g. behind an `Arc`); it holds no
/// per-request state.
pub struct Renderer<T> {
    typesetter: T,
    rasterizer: Rasterizer,
}

impl<T: Typesetter> Renderer<T> {
    pub fn new(typesetter: T, options: RasterOptions) -> Self {
        Self {
            typesetter,
            rasterizer: Rasterizer::new(options),
        }
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    /// Typeset `tex` and rasterize the result.
    ///
    /// `width` overrides the configured scale factor with a fixed content
    /// width. The rasterizer only runs once typesetting has succeeded.
    pub fn render(&self, tex: &str, width: Option<u32>) -> Result<RenderedImage> {
        let svg = self.typesetter.typeset(tex)?;
        let sizing = match width {
            Some(w) => Sizing::Width(w),
            None => Sizing::Scale(self.rasterizer.options().scale_factor),
        };
        Ok(self.rasterizer.rasterize_with(&svg, sizing)?)
    }
}
