//! Glyph names and the unified glyph order
//!
//! Every input font contributes all of its glyphs to the merged font. Names
//! are unique within one font but not across fonts, so later occurrences of
//! a name are renamed `name#1`, `name#2`, ... picking the smallest free suffix.

use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Deref,
};

use read_fonts::{FontRef, TableProvider};

/// A glyph name, possibly disambiguated during merging
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlyphName(String);

impl GlyphName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn suffixed(&self, n: usize) -> Self {
        Self(format!("{}#{n}", self.0))
    }
}

impl Deref for GlyphName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for GlyphName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for GlyphName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for GlyphName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for GlyphName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Display for GlyphName {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<&str> for GlyphName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for GlyphName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Tracks used names and the next suffix worth trying for each base name
#[derive(Debug, Default)]
struct NameSpace {
    hints: HashMap<GlyphName, usize>,
}

impl NameSpace {
    fn claim(&mut self, name: GlyphName) -> GlyphName {
        let Some(&hint) = self.hints.get(&name) else {
            self.hints.insert(name.clone(), 1);
            return name;
        };
        let mut n = hint;
        while self.hints.contains_key(&name.suffixed(n)) {
            n += 1;
        }
        let renamed = name.suffixed(n);
        self.hints.insert(name, n + 1);
        self.hints.insert(renamed.clone(), 1);
        renamed
    }
}

/// Unify the glyph orders of all input fonts
///
/// Renames colliding names in place and returns the merged order, which is
/// the concatenation of the renamed per-font orders.
pub fn merge_glyph_orders(orders: &mut [Vec<GlyphName>]) -> Vec<GlyphName> {
    let mut space = NameSpace::default();
    let mut mega = Vec::with_capacity(orders.iter().map(Vec::len).sum());
    for order in orders.iter_mut() {
        for name in order.iter_mut() {
            let claimed = space.claim(name.clone());
            *name = claimed.clone();
            mega.push(claimed);
        }
    }
    mega
}

/// Read a font's glyph order from its `post` table
///
/// Glyphs without a stored name get `glyphNNNNN` (or `.notdef` for glyph 0).
/// Names repeated within the font are made unique the same way collisions
/// across fonts are.
pub fn read_glyph_order(font: &FontRef) -> Vec<GlyphName> {
    let num_glyphs = font.maxp().map(|m| m.num_glyphs()).unwrap_or_default();
    let post = font.post().ok();
    let mut space = NameSpace::default();

    (0..num_glyphs)
        .map(|gid| {
            let name = post
                .as_ref()
                .and_then(|p| p.glyph_name(font_types::GlyphId16::new(gid)))
                .filter(|name| !name.is_empty())
                .map(GlyphName::from)
                .unwrap_or_else(|| match gid {
                    0 => GlyphName::new(".notdef"),
                    _ => GlyphName::new(format!("glyph{gid:05}")),
                });
            let claimed = space.claim(name.clone());
            if claimed != name {
                log::debug!("Renamed duplicate glyph name '{name}' to '{claimed}'");
            }
            claimed
        })
        .collect()
}
