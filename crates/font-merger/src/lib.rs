//! Merge several OpenType/TrueType fonts into one
//!
//! Glyph names are unified first: a name already taken by an earlier font
//! gets the smallest free `#n` suffix. Each table is then lifted into a
//! dynamic object, merged field by field with the rules in the registry,
//! and written back with write-fonts.

mod context;
mod error;
mod glyph_order;
mod layout;
mod merger;
mod object_merger;
mod options;
mod registry;
mod strategies;
mod tables;
mod types;
mod value;

pub use context::DuplicateGlyphMap;
pub use error::{MergeError, Result};
pub use glyph_order::{GlyphName, merge_glyph_orders};
pub use merger::{MergedFont, Merger};
pub use options::{IgnoreUnknown, Options};
pub use types::{Codepoint, FontIndex, GlyphId, MegaGlyphId, TableTag};

/// Merge multiple fonts from raw byte slices using default options.
///
/// This is a convenience wrapper around [`Merger`] for the common case
/// of merging fonts with default settings.
///
/// # Example
///
/// ```no_run
/// use fontmerge::merge_fonts_bytes;
///
/// let font1 = std::fs::read("font1.ttf").unwrap();
/// let font2 = std::fs::read("font2.ttf").unwrap();
/// let merged = merge_fonts_bytes(&[&font1, &font2]).unwrap();
/// ```
pub fn merge_fonts_bytes(fonts: &[&[u8]]) -> Result<Vec<u8>> {
    Merger::default().merge(fonts)
}
