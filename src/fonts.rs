//! Font discovery for figure text.
//!
//! Plotters draws text through `ab_glyph`, which needs font bytes registered
//! up front. The first usable font found is registered as `sans-serif` for the
//! rest of the process.

use plotters::style::{register_font, FontStyle};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Family name the renderer asks for.
pub const FAMILY: &str = "sans-serif";

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static REGISTERED: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Registers a text font once per process.
///
/// `extra` paths are tried before the system locations. Returns `false` when
/// no font could be loaded, in which case figures are drawn without text.
/// Only the paths given on the first call are considered.
pub fn ensure_font(extra: &[PathBuf]) -> bool {
    REGISTERED
        .get_or_init(|| {
            let found = extra
                .iter()
                .map(PathBuf::as_path)
                .chain(SYSTEM_FONTS.iter().map(Path::new))
                .find(|path| register(path, FontStyle::Normal));
            match found {
                Some(path) => {
                    register(&bold_variant(path), FontStyle::Bold);
                    debug!(font = %path.display(), "registered figure font");
                    Some(path.to_path_buf())
                }
                None => {
                    warn!("no usable TrueType font found; figure text is omitted");
                    None
                }
            }
        })
        .is_some()
}

/// The font registered by [`ensure_font`], if any.
pub fn registered_font() -> Option<&'static Path> {
    REGISTERED.get().and_then(Option::as_deref)
}

fn register(path: &Path, style: FontStyle) -> bool {
    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    // Registered fonts must outlive every chart; they stay for the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    register_font(FAMILY, style, bytes).is_ok()
}

/// Guesses the bold face that ships next to a regular one.
fn bold_variant(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bold = if stem.contains("Regular") {
        stem.replace("Regular", "Bold")
    } else if stem == "arial" {
        "arialbd".to_string()
    } else if stem == "Arial" {
        "Arial Bold".to_string()
    } else {
        format!("{stem}-Bold")
    };
    path.with_file_name(format!("{bold}.{ext}"))
}
