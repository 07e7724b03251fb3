//! Merge context and related types
//!
//! - `SourceFont`: one parsed input font with its renamed glyph order
//! - `MergeContext`: the per-run state passed to every reducer

use std::collections::HashMap;

use indexmap::IndexMap;
use read_fonts::{FontRef, TableProvider, types::Tag};

use crate::{
    MergeError, Result,
    glyph_order::GlyphName,
    layout::LayoutArena,
    options::Options,
    types::{FontIndex, GlyphId, MegaGlyphId},
};

/// Per font: glyph that won a codepoint collision -> this font's own glyph
pub type DuplicateGlyphMap = IndexMap<GlyphName, GlyphName>;

/// An input font after glyph unification
pub struct SourceFont<'a> {
    pub index: FontIndex,
    pub data: &'a [u8],
    pub font: FontRef<'a>,
    /// Names after unification, indexed by source glyph id
    pub glyph_order: Vec<GlyphName>,
    /// Merged id of this font's glyph 0
    pub glyph_offset: u16,
    /// Number of GDEF mark glyph sets in the fonts before this one
    pub mark_set_offset: u16,
}

impl<'a> SourceFont<'a> {
    pub fn glyph_name(&self, gid: GlyphId) -> Option<&GlyphName> {
        self.glyph_order.get(gid.0 as usize)
    }

    /// Name of a glyph id read from one of this font's tables
    pub fn require_name(&self, gid: u32) -> Result<GlyphName> {
        u16::try_from(gid)
            .ok()
            .and_then(|gid| self.glyph_name(GlyphId::new(gid)))
            .cloned()
            .ok_or_else(|| MergeError::UnknownGlyph(format!("{}:{gid}", self.index)))
    }

    pub fn mega_id(&self, gid: GlyphId) -> MegaGlyphId {
        MegaGlyphId::new(self.glyph_offset + gid.0)
    }

    pub fn num_glyphs(&self) -> u16 {
        self.glyph_order.len() as u16
    }

    pub fn mark_set_count(&self) -> u16 {
        self.font
            .gdef()
            .ok()
            .and_then(|gdef| gdef.mark_glyph_sets_def())
            .and_then(|sets| sets.ok())
            .map(|sets| sets.mark_glyph_set_count())
            .unwrap_or_default()
    }
}

/// State shared by all table merges of one run
pub struct MergeContext<'a> {
    pub fonts: Vec<SourceFont<'a>>,
    pub glyph_order: Vec<GlyphName>,
    name_to_mega: HashMap<GlyphName, MegaGlyphId>,
    /// Filled in by the cmap merge, consumed by the GSUB merge
    pub duplicates: Vec<DuplicateGlyphMap>,
    pub arena: LayoutArena,
    /// Tag of the table currently being merged
    pub table: Option<Tag>,
    pub options: &'a Options,
}

impl<'a> MergeContext<'a> {
    /// Assemble the context for fonts whose glyph orders are already unified
    ///
    /// `orders` holds each font's renamed glyph order and `glyph_order` their
    /// concatenation.
    pub fn new(
        loaded: Vec<(&'a [u8], FontRef<'a>)>,
        orders: Vec<Vec<GlyphName>>,
        glyph_order: Vec<GlyphName>,
        options: &'a Options,
    ) -> Self {
        let mut fonts = Vec::with_capacity(loaded.len());
        let mut glyph_offset = 0u16;
        let mut mark_set_offset = 0u16;
        for (i, ((data, font), order)) in loaded.into_iter().zip(orders).enumerate() {
            let source = SourceFont {
                index: FontIndex::new(i),
                data,
                font,
                glyph_order: order,
                glyph_offset,
                mark_set_offset,
            };
            glyph_offset = glyph_offset.saturating_add(source.num_glyphs());
            mark_set_offset = mark_set_offset.saturating_add(source.mark_set_count());
            fonts.push(source);
        }

        let name_to_mega = glyph_order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), MegaGlyphId::new(i as u16)))
            .collect();
        let duplicates = vec![DuplicateGlyphMap::new(); fonts.len()];

        Self {
            fonts,
            glyph_order,
            name_to_mega,
            duplicates,
            arena: LayoutArena::default(),
            table: None,
            options,
        }
    }

    pub fn font(&self, index: FontIndex) -> &SourceFont<'a> {
        &self.fonts[index.as_usize()]
    }

    pub fn mega_id(&self, name: &str) -> Option<MegaGlyphId> {
        self.name_to_mega.get(name).copied()
    }

    pub fn require_mega_id(&self, name: &str) -> Result<MegaGlyphId> {
        self.mega_id(name).ok_or_else(|| MergeError::UnknownGlyph(name.to_string()))
    }

    /// The font a merged glyph came from, with its id in that font
    pub fn origin(&self, name: &str) -> Option<(&SourceFont<'a>, GlyphId)> {
        let mega = self.mega_id(name)?.to_u16();
        let idx = self.fonts.partition_point(|f| f.glyph_offset <= mega).checked_sub(1)?;
        let font = &self.fonts[idx];
        Some((font, GlyphId::new(mega - font.glyph_offset)))
    }

    pub fn num_glyphs(&self) -> u16 {
        self.glyph_order.len() as u16
    }
}
