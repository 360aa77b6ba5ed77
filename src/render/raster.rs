//! SVG rasterization and scoped temporary image files

use resvg::tiny_skia::{Color, Pixmap, Transform};
use resvg::usvg::{fontdb, Options, Tree};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::error::{Result, ShapLensError};

/// System fonts, loaded once per process
fn font_database() -> Arc<fontdb::Database> {
    static FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            debug!(faces = db.len(), "Loaded system fonts");
            Arc::new(db)
        })
        .clone()
}

/// Render an SVG document to PNG bytes
pub fn svg_to_png(svg: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let mut options = Options::default();
    options.fontdb = font_database();

    let tree = Tree::from_data(svg.as_bytes(), &options)?;

    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| ShapLensError::RenderError(format!("cannot allocate {}x{} image", width, height)))?;
    // Opaque background keeps premultiplied pixels equal to straight RGBA
    pixmap.fill(Color::WHITE);
    resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .write_header()
        .map_err(|e| ShapLensError::RenderError(e.to_string()))?
        .write_image_data(pixmap.data())
        .map_err(|e| ShapLensError::RenderError(e.to_string()))?;

    Ok(out)
}

/// Write a PNG to a temporary file, hand its path to `display`, then delete it
///
/// The file is removed when this returns, whether `display` succeeded or not.
pub fn stage_png<T>(png: &[u8], display: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let mut file = tempfile::Builder::new()
        .prefix("shaplens-")
        .suffix(".png")
        .tempfile()?;
    file.write_all(png)?;
    file.flush()?;
    debug!(path = %file.path().display(), bytes = png.len(), "Staged temporary image");

    display(file.path())
}
