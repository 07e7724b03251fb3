//! Main font merger implementation

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Instant,
};

use indexmap::IndexMap;
use log::{debug, info, warn};
use read_fonts::{FontRef, types::Tag};
use write_fonts::FontBuilder;

use crate::{
    MergeError, Result,
    context::{DuplicateGlyphMap, MergeContext},
    glyph_order::{GlyphName, merge_glyph_orders, read_glyph_order},
    layout::{
        GSUB,
        reindex::{dereference, reindex},
    },
    object_merger::merge_objects,
    options::Options,
    registry::{TableRule, table_rule},
    tables::{cmap, is_indexed_layout, lift_table, lower_tables},
    types::FontIndex,
    value::{Object, Value},
};

const TIMER: &str = "fontmerge::timer";

/// The merged font before serialization
#[derive(Debug, Clone)]
pub struct MergedFont {
    /// Unified glyph order of the output
    pub glyph_order: Vec<GlyphName>,
    /// Per input font: glyph that won a codepoint -> the font's own glyph
    pub duplicates: Vec<DuplicateGlyphMap>,
    tables: BTreeMap<Tag, Vec<u8>>,
}

impl MergedFont {
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tables.keys().copied()
    }

    pub fn table(&self, tag: Tag) -> Option<&[u8]> {
        self.tables.get(&tag).map(Vec::as_slice)
    }

    /// Assemble the font file
    pub fn build(&self) -> Vec<u8> {
        let mut builder = FontBuilder::new();
        for (tag, data) in &self.tables {
            builder.add_raw(*tag, data.clone());
        }
        builder.build()
    }
}

/// Font merger that combines multiple fonts into one
#[derive(Debug, Default)]
pub struct Merger {
    options: Options,
}

impl Merger {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Merge multiple fonts from raw byte slices and serialize the result
    pub fn merge(&self, fonts: &[&[u8]]) -> Result<Vec<u8>> {
        Ok(self.merge_to_font(fonts)?.build())
    }

    /// Merge multiple fonts from raw byte slices
    pub fn merge_to_font(&self, fonts: &[&[u8]]) -> Result<MergedFont> {
        if fonts.is_empty() {
            return Err(MergeError::NoFonts);
        }
        let start = Instant::now();

        let loaded = fonts
            .iter()
            .enumerate()
            .map(|(i, data)| {
                FontRef::new(data)
                    .map(|font| (*data, font))
                    .map_err(|source| MergeError::Load { index: FontIndex::new(i), source })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut orders: Vec<Vec<GlyphName>> =
            loaded.iter().map(|(_, font)| read_glyph_order(font)).collect();
        let glyph_order = merge_glyph_orders(&mut orders);
        if glyph_order.len() > u16::MAX as usize {
            return Err(MergeError::TooManyGlyphs(glyph_order.len()));
        }
        info!("Merging {} fonts with {} total glyphs", fonts.len(), glyph_order.len());

        let tags = table_tags(&loaded);
        let mut cx = MergeContext::new(loaded, orders, glyph_order, &self.options);
        let columns = lift_all(&mut cx, &tags)?;
        let mut merged = self.merge_tables(&mut cx, columns)?;

        for (tag, table) in merged.iter_mut() {
            if is_indexed_layout(*tag) {
                reindex(*tag, table, &mut cx.arena)?;
            }
        }

        let tables = lower_tables(&cx, &merged)?;
        if self.options.timing {
            info!(target: TIMER, "Took {:.3}s to merge fonts", start.elapsed().as_secs_f64());
        }

        Ok(MergedFont {
            glyph_order: std::mem::take(&mut cx.glyph_order),
            duplicates: std::mem::take(&mut cx.duplicates),
            tables,
        })
    }

    fn merge_tables(
        &self,
        cx: &mut MergeContext,
        columns: IndexMap<Tag, Vec<Option<Value>>>,
    ) -> Result<IndexMap<Tag, Object>> {
        let mut merged = IndexMap::new();
        for (tag, column) in columns {
            let Some(rule) = table_rule(tag) else {
                warn!("Dropped '{tag}': don't know how to merge");
                continue;
            };
            info!("Merging '{tag}'.");
            let start = Instant::now();
            cx.table = Some(tag);
            let result = match rule {
                TableRule::Custom(procedure) => procedure(cx, column)?,
                TableRule::Map => merge_objects(cx, column)?,
            };
            cx.table = None;
            match result {
                Some(Value::Object(table)) => {
                    info!("Merged '{tag}'.");
                    merged.insert(tag, table);
                }
                Some(other) => {
                    return Err(MergeError::TypeMismatch {
                        class: tag.to_string(),
                        field: other.kind().to_string(),
                    });
                }
                None => info!("Dropped '{tag}'."),
            }
            if self.options.timing {
                info!(target: TIMER, "Took {:.3}s to merge '{tag}'", start.elapsed().as_secs_f64());
            }
        }
        Ok(merged)
    }
}

/// Every table tag in any font: cmap first, then GSUB, then the rest sorted
///
/// GSUB is included whenever cmap is, since resolving codepoint collisions
/// needs it even if no font carries one.
fn table_tags(fonts: &[(&[u8], FontRef)]) -> Vec<Tag> {
    let mut tags: BTreeSet<Tag> = fonts
        .iter()
        .flat_map(|(_, font)| font.table_directory.table_records().iter().map(|r| r.tag()))
        .collect();
    let mut ordered = Vec::with_capacity(tags.len() + 1);
    if tags.remove(&cmap::TAG) {
        ordered.push(cmap::TAG);
        tags.remove(&GSUB);
        ordered.push(GSUB);
    } else if tags.remove(&GSUB) {
        ordered.push(GSUB);
    }
    ordered.extend(tags);
    ordered
}

/// Lift each table of each font, resolving layout indices to arena handles
fn lift_all(cx: &mut MergeContext, tags: &[Tag]) -> Result<IndexMap<Tag, Vec<Option<Value>>>> {
    let mut columns = IndexMap::with_capacity(tags.len());
    for &tag in tags {
        if table_rule(tag).is_none() {
            columns.insert(tag, Vec::new());
            continue;
        }
        let mut column = Vec::with_capacity(cx.fonts.len());
        for src in &cx.fonts {
            let mut value = lift_table(src, tag, &mut cx.arena)?;
            if is_indexed_layout(tag)
                && let Some(Value::Object(table)) = value.as_mut()
            {
                dereference(tag, table, &mut cx.arena)?;
            }
            column.push(value);
        }
        debug!("Lifted '{tag}' from {} fonts", column.iter().flatten().count());
        columns.insert(tag, column);
    }
    Ok(columns)
}
