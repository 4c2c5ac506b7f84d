//! SVG -> PNG rasterization
//!
//! The SVG is parsed with usvg, its intrinsic size is probed from the parsed
//! tree, and it is drawn with resvg onto an opaque tiny-skia canvas:
//!
//! ```text
//! +------------------------------+  padding_color
//! |  +------------------------+  |
//! |  |   background           |  |  content box = intrinsic size * scale
//! |  |      (svg, per `fit`)  |  |
//! |  +------------------------+  |
//! +------------------------------+  padding_px on every side
//! ```

use std::fmt;
use std::str::FromStr;

use log::debug;
use resvg::tiny_skia::{self, Paint, Pixmap, Transform};
use resvg::usvg;

use crate::error::RasterError;
use crate::rendering::RenderedImage;

/// An opaque RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn to_color(self) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, 255)
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Parses `#rrggbb` or `rrggbb`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{}', expected #rrggbb", s));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// How the SVG is placed inside the content box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fit {
    /// Uniform scale, centered (letterboxed if the box was rounded)
    #[default]
    Contain,
    /// Independent x/y scale to exactly cover the box
    Fill,
}

impl Fit {
    /// Returns `(sx, sy, dx, dy)` mapping a `width`x`height` image into the box.
    fn place(self, width: f32, height: f32, box_w: u32, box_h: u32) -> (f32, f32, f32, f32) {
        let (bw, bh) = (box_w as f32, box_h as f32);
        match self {
            Fit::Contain => {
                let s = (bw / width).min(bh / height);
                (s, s, (bw - width * s) / 2.0, (bh - height * s) / 2.0)
            }
            Fit::Fill => (bw / width, bh / height, 0.0, 0.0),
        }
    }
}

impl FromStr for Fit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(Fit::Contain),
            "fill" => Ok(Fit::Fill),
            other => Err(format!("invalid fit '{}', expected 'contain' or 'fill'", other)),
        }
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fit::Contain => "contain",
            Fit::Fill => "fill",
        })
    }
}

/// How big the content box should be
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    /// Multiply the intrinsic size by this factor
    Scale(f32),
    /// Scale so the content box is exactly this many pixels wide
    Width(u32),
}

/// Rasterization settings
///
/// The defaults produce a 10x upscale with a 20px white margin, flattened
/// onto white.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    /// Multiplier applied to the SVG's intrinsic size
    pub scale_factor: f32,
    /// Margin added on each side of the content box
    pub padding_px: u32,
    /// Colour behind the SVG inside the content box
    pub background: Rgb,
    /// Colour of the margin
    pub padding_color: Rgb,
    /// Placement of the SVG inside the content box
    pub fit: Fit,
    /// Largest allowed output width or height, margin included
    pub max_dimension: u32,
    /// Largest allowed output area (width * height), margin included
    pub max_pixels: u64,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale_factor: 10.0,
            padding_px: 20,
            background: Rgb::WHITE,
            padding_color: Rgb::WHITE,
            fit: Fit::Contain,
            max_dimension: 16384,
            // 4096x4096, 64 MiB of RGBA
            max_pixels: 16_777_216,
        }
    }
}

/// Converts SVG markup into opaque PNG images
///
/// Holds the usvg parse options, including the font database used for
/// `<text>` elements (MathJax emits those for characters outside its own
/// fonts, e.g. CJK in `\text{}`). System fonts are loaded once here.
pub struct Rasterizer {
    options: RasterOptions,
    usvg: usvg::Options<'static>,
}

impl fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rasterizer")
            .field("options", &self.options)
            .field("fonts", &self.font_count())
            .finish()
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(RasterOptions::default())
    }
}

impl Rasterizer {
    pub fn new(options: RasterOptions) -> Self {
        let mut usvg = usvg::Options::default();
        let fontdb = usvg.fontdb_mut();
        fontdb.load_system_fonts();
        fill_generic_families(fontdb);
        debug!("loaded {} font faces for SVG text", fontdb.len());
        Self { options, usvg }
    }

    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Number of font faces available to `<text>` elements
    pub fn font_count(&self) -> usize {
        self.usvg.fontdb.len()
    }

    /// Rasterize using the configured scale factor
    pub fn rasterize(&self, svg: &str) -> Result<RenderedImage, RasterError> {
        self.rasterize_with(svg, Sizing::Scale(self.options.scale_factor))
    }

    pub fn rasterize_with(&self, svg: &str, sizing: Sizing) -> Result<RenderedImage, RasterError> {
        let tree = usvg::Tree::from_str(svg, &self.usvg)
            .map_err(|e| RasterError::Parse(e.to_string()))?;
        let (width, height) = intrinsic_size(&tree)?;

        let scale = match sizing {
            Sizing::Scale(s) => s,
            Sizing::Width(w) => w as f32 / width,
        };
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RasterError::InvalidDimensions {
                width: width * scale,
                height: height * scale,
            });
        }

        let opts = &self.options;
        let box_w = (width as f64 * scale as f64).round().max(1.0);
        let box_h = (height as f64 * scale as f64).round().max(1.0);
        let pad = opts.padding_px as f64 * 2.0;
        let (total_w, total_h) = (box_w + pad, box_h + pad);
        if total_w > opts.max_dimension as f64 || total_h > opts.max_dimension as f64 {
            return Err(RasterError::TooLarge {
                width: total_w as u64,
                height: total_h as u64,
                max: opts.max_dimension,
            });
        }
        let (box_w, box_h) = (box_w as u32, box_h as u32);
        let (total_w, total_h) = (total_w as u32, total_h as u32);
        if total_w as u64 * total_h as u64 > opts.max_pixels {
            return Err(RasterError::TooManyPixels {
                width: total_w,
                height: total_h,
                max: opts.max_pixels,
            });
        }
        debug!(
            "rasterizing {:.2}x{:.2} svg at scale {:.3} into {}x{}",
            width, height, scale, total_w, total_h
        );

        let mut pixmap = Pixmap::new(total_w, total_h).ok_or(RasterError::Allocation {
            width: total_w,
            height: total_h,
        })?;

        // Opaque canvas first so any transparency in the SVG is flattened.
        pixmap.fill(opts.padding_color.to_color());
        let pad = opts.padding_px as f32;
        if let Some(content) = tiny_skia::Rect::from_xywh(pad, pad, box_w as f32, box_h as f32) {
            let mut paint = Paint::default();
            paint.set_color(opts.background.to_color());
            paint.anti_alias = false;
            pixmap.fill_rect(content, &paint, Transform::identity(), None);
        }

        let (sx, sy, dx, dy) = opts.fit.place(width, height, box_w, box_h);
        let transform = Transform::from_scale(sx, sy).post_translate(pad + dx, pad + dy);
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let png_data = pixmap
            .encode_png()
            .map_err(|e| RasterError::Encode(e.to_string()))?;

        Ok(RenderedImage {
            width: total_w,
            height: total_h,
            png_data,
        })
    }
}

/// Intrinsic size of a parsed SVG in px (units such as `ex` already resolved)
fn intrinsic_size(tree: &usvg::Tree) -> Result<(f32, f32), RasterError> {
    let size = tree.size();
    let (width, height) = (size.width(), size.height());
    if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
        return Err(RasterError::InvalidDimensions { width, height });
    }
    Ok((width, height))
}

/// Point the generic families (serif, sans-serif, monospace) at an installed
/// face when fontdb's built-in defaults are missing, so text always resolves
/// to some font and per-glyph fallback can take over from there.
fn fill_generic_families(db: &mut usvg::fontdb::Database) {
    use usvg::fontdb::{Family, Query};

    let Some(fallback) = db
        .faces()
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()))
    else {
        return;
    };

    let resolves = |db: &usvg::fontdb::Database, family: Family<'_>| {
        db.query(&Query {
            families: &[family],
            ..Default::default()
        })
        .is_some()
    };
    if !resolves(db, Family::Serif) {
        db.set_serif_family(fallback.clone());
    }
    if !resolves(db, Family::SansSerif) {
        db.set_sans_serif_family(fallback.clone());
    }
    if !resolves(db, Family::Monospace) {
        db.set_monospace_family(fallback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 10x5 canvas, transparent except a black 2x1 block in the middle
    const BLOCK_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="5" viewBox="0 0 10 5"><rect x="4" y="2" width="2" height="1" fill="#000"/></svg>"##;

    fn options(scale: f32, padding: u32) -> RasterOptions {
        RasterOptions {
            scale_factor: scale,
            padding_px: padding,
            background: Rgb::WHITE,
            padding_color: Rgb::new(32, 32, 32),
            ..Default::default()
        }
    }

    fn pixel(img: &RenderedImage, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let pixmap = Pixmap::decode_png(&img.png_data).expect("decodable png");
        let p = pixmap.pixel(x, y).expect("pixel in bounds");
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    #[test]
    fn scales_and_pads() {
        let img = Rasterizer::new(options(4.0, 10)).rasterize(BLOCK_SVG).unwrap();
        assert_eq!((img.width, img.height), (60, 40));
        assert!(img.png_data.starts_with(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]));
    }

    #[test]
    fn margin_content_and_svg_colours() {
        let img = Rasterizer::new(options(4.0, 10)).rasterize(BLOCK_SVG).unwrap();
        // margin corners
        assert_eq!(pixel(&img, 0, 0), (32, 32, 32, 255));
        assert_eq!(pixel(&img, 59, 39), (32, 32, 32, 255));
        // flattened background inside the content box
        assert_eq!(pixel(&img, 11, 11), (255, 255, 255, 255));
        // the black block: svg (4..6, 2..3) -> canvas (26..34, 18..22)
        assert_eq!(pixel(&img, 30, 20), (0, 0, 0, 255));
    }

    #[test]
    fn output_is_fully_opaque() {
        let img = Rasterizer::new(options(3.0, 5)).rasterize(BLOCK_SVG).unwrap();
        let pixmap = Pixmap::decode_png(&img.png_data).unwrap();
        assert!(pixmap.pixels().iter().all(|p| p.alpha() == 255));
    }

    #[test]
    fn doubling_scale_doubles_content() {
        let r = Rasterizer::new(options(4.0, 0));
        let small = r.rasterize_with(BLOCK_SVG, Sizing::Scale(4.0)).unwrap();
        let large = r.rasterize_with(BLOCK_SVG, Sizing::Scale(8.0)).unwrap();
        assert_eq!(large.width, small.width * 2);
        assert_eq!(large.height, small.height * 2);
    }

    #[test]
    fn width_sizing_keeps_aspect_ratio() {
        let img = Rasterizer::new(options(10.0, 20))
            .rasterize_with(BLOCK_SVG, Sizing::Width(300))
            .unwrap();
        assert_eq!((img.width, img.height), (340, 190));
    }

    #[test]
    fn resolves_ex_units() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="4ex" height="2ex" viewBox="0 -750 2000 1000"><path d="M0 -750H2000V250H0Z"/></svg>"#;
        let img = Rasterizer::new(options(1.0, 0)).rasterize(svg).unwrap();
        assert!(img.width > 0 && img.height > 0);
        assert_eq!(img.width, img.height * 2);
    }

    #[test]
    fn fill_stretches_and_contain_does_not() {
        assert_eq!(Fit::Fill.place(10.0, 5.0, 40, 40), (4.0, 8.0, 0.0, 0.0));
        assert_eq!(Fit::Contain.place(10.0, 5.0, 40, 40), (4.0, 4.0, 0.0, 10.0));
    }

    #[test]
    fn rejects_garbage() {
        let err = Rasterizer::default().rasterize("this is not svg").unwrap_err();
        assert!(matches!(err, RasterError::Parse(_)), "{:?}", err);
    }

    #[test]
    fn rejects_zero_size() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="0"></svg>"#;
        let err = Rasterizer::default().rasterize(svg).unwrap_err();
        assert!(
            matches!(err, RasterError::Parse(_) | RasterError::InvalidDimensions { .. }),
            "{:?}",
            err
        );
    }

    #[test]
    fn rejects_oversized_output() {
        let opts = RasterOptions {
            max_dimension: 100,
            ..options(20.0, 0)
        };
        let err = Rasterizer::new(opts).rasterize(BLOCK_SVG).unwrap_err();
        assert_eq!(
            err,
            RasterError::TooLarge {
                width: 200,
                height: 100,
                max: 100
            }
        );
    }

    #[test]
    fn rejects_output_over_pixel_budget() {
        let opts = RasterOptions {
            max_pixels: 10_000,
            ..options(20.0, 0)
        };
        let err = Rasterizer::new(opts).rasterize(BLOCK_SVG).unwrap_err();
        assert_eq!(
            err,
            RasterError::TooManyPixels {
                width: 200,
                height: 100,
                max: 10_000
            }
        );
    }

    #[test]
    fn draws_svg_text() {
        let rasterizer = Rasterizer::new(options(4.0, 0));
        if rasterizer.font_count() == 0 {
            println!("No system fonts installed; skipping text rendering check.");
            return;
        }
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="14"><text x="2" y="12" font-size="10" fill="#000">MM</text></svg>"##;
        let img = rasterizer.rasterize(svg).unwrap();
        let pixmap = Pixmap::decode_png(&img.png_data).unwrap();
        let dark = pixmap
            .pixels()
            .iter()
            .filter(|p| p.red() < 128 && p.green() < 128 && p.blue() < 128)
            .count();
        assert!(dark > 0, "text was not drawn");
    }

    #[test]
    fn rejects_non_positive_scale() {
        let err = Rasterizer::default()
            .rasterize_with(BLOCK_SVG, Sizing::Scale(0.0))
            .unwrap_err();
        assert!(matches!(err, RasterError::InvalidDimensions { .. }));
    }

    #[test]
    fn parses_colours_and_fit() {
        assert_eq!("#202020".parse::<Rgb>(), Ok(Rgb::new(32, 32, 32)));
        assert_eq!("FFffFF".parse::<Rgb>(), Ok(Rgb::WHITE));
        assert!("#fff".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
        assert_eq!(Rgb::new(32, 32, 32).to_string(), "#202020");
        assert_eq!("Fill".parse::<Fit>(), Ok(Fit::Fill));
        assert!("cover".parse::<Fit>().is_err());
    }
}
