//! cmap table
//!
//! Each font contributes one Unicode subtable: its full-repertoire
//! subtable when it has one, its BMP subtable otherwise. Codepoints are
//! claimed by the first font that maps them. When a later font maps a
//! claimed codepoint to a glyph that looks different, the pair is recorded
//! in that font's duplicate glyph map so the GSUB merge can add a `locl`
//! rule for it.

use indexmap::IndexMap;
use log::warn;
use read_fonts::{
    TableProvider,
    tables::cmap::{CmapSubtable, EncodingRecord},
    types::{GlyphId as ReadGlyphId, Tag},
};
use skrifa::{
    MetadataProvider,
    instance::{LocationRef, Size},
    outline::{DrawSettings, OutlinePen},
};
use write_fonts::tables::cmap::Cmap;

use super::metrics::{HMTX, VMTX, advance};
use crate::{
    MergeError, Result,
    context::{MergeContext, SourceFont},
    glyph_order::GlyphName,
    types::Codepoint,
    value::{Object, Value},
};

pub const TAG: Tag = Tag::new(b"cmap");

/// (format, platformID, platEncID) of the subtables covering the BMP
const BMP: [(u16, u16, u16); 4] = [(4, 3, 1), (4, 0, 3), (4, 0, 4), (4, 0, 6)];
/// (format, platformID, platEncID) of the subtables covering all of Unicode
const FULL_REPERTOIRE: [(u16, u16, u16); 3] = [(12, 3, 10), (12, 0, 4), (12, 0, 6)];

pub fn lift_cmap(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(cmap) = src.font.cmap() else {
        return Ok(None);
    };
    let data = cmap.offset_data();
    let mut bmp = None;
    let mut full = None;
    for record in cmap.encoding_records() {
        let subtable = record.subtable(data)?;
        let key = subtable_key(record, &subtable);
        let (format, platform_id, encoding_id) = key;
        // the last subtable of each class wins
        let slot = if BMP.contains(&key) {
            &mut bmp
        } else if FULL_REPERTOIRE.contains(&key) {
            &mut full
        } else {
            warn!(
                "Dropped cmap subtable from font '{}':\t{format}, {platform_id}, {encoding_id}",
                src.index.as_usize()
            );
            continue;
        };
        *slot = Some(char_map(src, subtable));
    }
    let obj = Object::new("cmap")
        .with("tableTag", TAG)
        .with_opt("bmp", bmp)
        .with_opt("full", full);
    Ok(Some(obj.into()))
}

/// (format, platformID, platEncID) of one encoding record
fn subtable_key(record: &EncodingRecord, subtable: &CmapSubtable) -> (u16, u16, u16) {
    let format = match subtable {
        CmapSubtable::Format0(_) => 0,
        CmapSubtable::Format2(_) => 2,
        CmapSubtable::Format4(_) => 4,
        CmapSubtable::Format6(_) => 6,
        CmapSubtable::Format8(_) => 8,
        CmapSubtable::Format10(_) => 10,
        CmapSubtable::Format12(_) => 12,
        CmapSubtable::Format13(_) => 13,
        CmapSubtable::Format14(_) => 14,
    };
    (format, record.platform_id() as u16, record.encoding_id())
}

/// Codepoint to glyph name mapping of one subtable
///
/// Entries pointing past the end of the font are skipped.
fn char_map(src: &SourceFont, subtable: CmapSubtable) -> Value {
    let pairs: Vec<(u32, ReadGlyphId)> = match subtable {
        CmapSubtable::Format4(f4) => f4.iter().collect(),
        CmapSubtable::Format6(f6) => f6.iter().collect(),
        CmapSubtable::Format10(f10) => f10.iter().collect(),
        CmapSubtable::Format12(f12) => f12.iter().collect(),
        CmapSubtable::Format13(f13) => f13.iter().collect(),
        _ => {
            warn!(
                "Cannot read codepoints of cmap subtable from font '{}'",
                src.index.as_usize()
            );
            Vec::new()
        }
    };
    let mut map = IndexMap::with_capacity(pairs.len());
    for (codepoint, gid) in pairs {
        match src.require_name(gid.to_u32()) {
            Ok(name) => {
                map.insert(codepoint, name);
            }
            Err(_) => warn!(
                "Skipping codepoint {} of font '{}': glyph {} is out of range",
                Codepoint::new(codepoint),
                src.index.as_usize(),
                gid.to_u32()
            ),
        }
    }
    Value::CharMap(map)
}

/// Build the merged mapping and the per-font duplicate glyph maps
pub fn merge_cmap(cx: &mut MergeContext, tables: Vec<Option<Value>>) -> Result<Option<Value>> {
    let mut chosen = Vec::new();
    for (font, table) in tables.into_iter().enumerate() {
        let Some(mut table) = table.and_then(Value::into_object) else {
            continue;
        };
        let subtable = table.remove("full").or_else(|| table.remove("bmp"));
        if let Some(Value::CharMap(map)) = subtable {
            chosen.push((font, map));
        }
    }
    if chosen.is_empty() {
        return Ok(None);
    }

    let mut mapping: IndexMap<u32, GlyphName> = IndexMap::new();
    for (font, map) in chosen {
        for (codepoint, glyph) in map {
            let Some(winner) = mapping.get(&codepoint).cloned() else {
                mapping.insert(codepoint, glyph);
                continue;
            };
            if winner == glyph {
                continue;
            }
            let recorded = cx.duplicates.get(font).and_then(|dups| dups.get(&winner)).cloned();
            match recorded {
                None => {
                    if glyphs_are_same(cx, &winner, &glyph)? {
                        continue;
                    }
                    if let Some(dups) = cx.duplicates.get_mut(font) {
                        dups.insert(winner, glyph);
                    }
                }
                Some(recorded) if recorded != glyph => {
                    warn!(
                        "Dropped mapping from codepoint {} to glyphId '{glyph}'",
                        Codepoint::new(codepoint)
                    );
                }
                Some(_) => {}
            }
        }
    }

    let obj = Object::new("cmap").with("tableTag", TAG).with("mapping", Value::CharMap(mapping));
    Ok(Some(obj.into()))
}

/// One drawing command of a glyph outline
#[derive(Debug, PartialEq)]
enum PathCommand {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    QuadTo(f32, f32, f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    Close,
}

#[derive(Debug, Default, PartialEq)]
struct RecordingPen(Vec<PathCommand>);

impl OutlinePen for RecordingPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.push(PathCommand::MoveTo(x, y));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.push(PathCommand::LineTo(x, y));
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        self.0.push(PathCommand::QuadTo(cx0, cy0, x, y));
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.0.push(PathCommand::CurveTo(cx0, cy0, cx1, cy1, x, y));
    }

    fn close(&mut self) {
        self.0.push(PathCommand::Close);
    }
}

/// Draw a source glyph, components decomposed, in font units
fn record(src: &SourceFont, gid: u16, name: &GlyphName) -> Result<RecordingPen> {
    let mut pen = RecordingPen::default();
    let Some(glyph) = src.font.outline_glyphs().get(ReadGlyphId::new(gid as u32)) else {
        return Ok(pen);
    };
    let settings = DrawSettings::unhinted(Size::unscaled(), LocationRef::default());
    glyph
        .draw(settings, &mut pen)
        .map_err(|e| MergeError::Outline { glyph: name.to_string(), reason: e.to_string() })?;
    Ok(pen)
}

/// Whether two merged glyphs draw the same and share their advances
fn glyphs_are_same(cx: &MergeContext, a: &GlyphName, b: &GlyphName) -> Result<bool> {
    let (Some((font_a, gid_a)), Some((font_b, gid_b))) = (cx.origin(a), cx.origin(b)) else {
        return Ok(false);
    };
    let (gid_a, gid_b) = (gid_a.to_u16(), gid_b.to_u16());
    if record(font_a, gid_a, a)? != record(font_b, gid_b, b)? {
        return Ok(false);
    }
    if advance(font_a, HMTX, gid_a) != advance(font_b, HMTX, gid_b) {
        return Ok(false);
    }
    let vertical = advance(font_a, VMTX, gid_a);
    Ok(vertical.is_none() || vertical == advance(font_b, VMTX, gid_b))
}

/// Format 4 for the BMP, plus format 12 when a codepoint lies beyond it
pub fn lower_cmap(cx: &MergeContext, obj: &Object) -> Result<Cmap> {
    let Some(Value::CharMap(mapping)) = obj.get("mapping") else {
        return Err(obj.type_mismatch("mapping"));
    };
    let mut pairs = Vec::with_capacity(mapping.len());
    for (codepoint, name) in mapping {
        let Some(ch) = Codepoint::new(*codepoint).to_char() else {
            warn!("Skipping invalid codepoint {}", Codepoint::new(*codepoint));
            continue;
        };
        let gid = cx.require_mega_id(name)?;
        pairs.push((ch, font_types::GlyphId::new(gid.to_u32())));
    }
    Ok(Cmap::from_mappings(pairs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use read_fonts::{
        FontData, FontRead, FontRef,
        tables::cmap::{Cmap as ReadCmap, PlatformId},
    };
    use write_fonts::{
        FontBuilder,
        tables::cmap::{CmapSubtable as WriteSubtable, EncodingRecord as WriteRecord},
    };

    use crate::{context::tests::empty_context, options::Options};

    fn cmap(pairs: &[(u32, &str)], full: bool) -> Option<Value> {
        let map = pairs.iter().map(|(cp, name)| (*cp, GlyphName::from(*name))).collect();
        let field = if full { "full" } else { "bmp" };
        Some(Object::new("cmap").with("tableTag", TAG).with(field, Value::CharMap(map)).into())
    }

    fn merged_mapping(value: Option<Value>) -> IndexMap<u32, GlyphName> {
        match value.and_then(Value::into_object).and_then(|mut obj| obj.remove("mapping")) {
            Some(Value::CharMap(map)) => map,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_first_font_claims_codepoints() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        cx.duplicates = vec![Default::default(); 2];
        let merged = merge_cmap(
            &mut cx,
            vec![cmap(&[(0x41, "A")], false), cmap(&[(0x41, "A#1"), (0x42, "B")], false)],
        )
        .unwrap();
        let mapping = merged_mapping(merged);
        assert_eq!(mapping.get(&0x41).map(GlyphName::as_str), Some("A"));
        assert_eq!(mapping.get(&0x42).map(GlyphName::as_str), Some("B"));
        // without source outlines the glyphs cannot be shown to be the same
        assert_eq!(cx.duplicates[1].get("A").map(GlyphName::as_str), Some("A#1"));
        assert!(cx.duplicates[0].is_empty());
    }

    #[test]
    fn test_full_repertoire_preferred() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        cx.duplicates = vec![Default::default()];
        let mut table = Object::new("cmap")
            .with("tableTag", TAG)
            .with("bmp", Value::CharMap([(0x41, GlyphName::from("A"))].into_iter().collect()));
        table.set(
            "full",
            Value::CharMap([(0x1F600, GlyphName::from("smile"))].into_iter().collect()),
        );
        let mapping = merged_mapping(merge_cmap(&mut cx, vec![Some(table.into())]).unwrap());
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains_key(&0x1F600));
    }

    #[test]
    fn test_second_collision_on_same_glyph_is_dropped() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        cx.duplicates = vec![Default::default(); 2];
        merge_cmap(
            &mut cx,
            vec![
                cmap(&[(0x41, "A"), (0x61, "A")], false),
                cmap(&[(0x41, "A#1"), (0x61, "a")], false),
            ],
        )
        .unwrap();
        assert_eq!(cx.duplicates[1].len(), 1);
        assert_eq!(cx.duplicates[1].get("A").map(GlyphName::as_str), Some("A#1"));
    }

    #[test]
    fn test_lower_adds_full_repertoire_only_when_needed() {
        let options = Options::default();
        let order: Vec<GlyphName> = vec![".notdef".into(), "A".into(), "smile".into()];
        let cx = MergeContext::new(Vec::new(), Vec::new(), order, &options);

        let bmp_only = Object::new("cmap")
            .with("mapping", Value::CharMap([(0x41, GlyphName::from("A"))].into_iter().collect()));
        let bytes = write_fonts::dump_table(&lower_cmap(&cx, &bmp_only).unwrap()).unwrap();
        let read = ReadCmap::read(FontData::new(&bytes)).unwrap();
        assert_eq!(read.map_codepoint('A'), Some(ReadGlyphId::new(1)));
        assert!(read.encoding_records().iter().all(|r| r.encoding_id() != 10));

        let with_emoji = Object::new("cmap").with(
            "mapping",
            Value::CharMap(
                [(0x41, GlyphName::from("A")), (0x1F600, GlyphName::from("smile"))]
                    .into_iter()
                    .collect(),
            ),
        );
        let bytes = write_fonts::dump_table(&lower_cmap(&cx, &with_emoji).unwrap()).unwrap();
        let read = ReadCmap::read(FontData::new(&bytes)).unwrap();
        assert_eq!(read.map_codepoint('\u{1F600}'), Some(ReadGlyphId::new(2)));
    }

    #[test]
    fn test_no_tables() {
        let options = Options::default();
        let mut cx = empty_context(&options);
        assert_eq!(merge_cmap(&mut cx, vec![None, None]).unwrap(), None);
    }

    fn lift_from(cmap: &Cmap, names: &[&str]) -> Option<Value> {
        let options = Options::default();
        let bytes = FontBuilder::new().add_table(cmap).unwrap().build();
        let font = FontRef::new(&bytes).unwrap();
        let order: Vec<GlyphName> = names.iter().map(|name| GlyphName::from(*name)).collect();
        let loaded = vec![(bytes.as_slice(), font)];
        let cx = MergeContext::new(loaded, vec![order.clone()], order, &options);
        lift_cmap(cx.font(crate::types::FontIndex::new(0))).unwrap()
    }

    #[test]
    fn test_lift_skips_glyphs_past_end_of_font() {
        let cmap = Cmap::from_mappings([
            ('A', font_types::GlyphId::new(1)),
            ('B', font_types::GlyphId::new(5)),
        ])
        .unwrap();
        let lifted = lift_from(&cmap, &[".notdef", "A"]).and_then(Value::into_object).unwrap();
        let Some(Value::CharMap(map)) = lifted.get("bmp") else {
            panic!("missing bmp subtable: {lifted:?}");
        };
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&0x41).map(GlyphName::as_str), Some("A"));
    }

    #[test]
    fn test_lift_drops_unsupported_subtables() {
        // format 6, first code 0x41, two glyphs
        let subtable = WriteSubtable::format_6(14, 0, 0x41, 2, vec![1, 2]);
        let cmap = Cmap::new(vec![WriteRecord::new(PlatformId::Windows, 1, subtable)]);
        let lifted = lift_from(&cmap, &[".notdef", "A", "B"]).and_then(Value::into_object).unwrap();
        assert!(lifted.get("bmp").is_none());
        assert!(lifted.get("full").is_none());
    }

    #[test]
    fn test_char_map_reads_format_6() {
        let subtable = WriteSubtable::format_6(14, 0, 0x41, 2, vec![1, 9]);
        let bytes = write_fonts::dump_table(&subtable).unwrap();
        let subtable = CmapSubtable::read(FontData::new(&bytes)).unwrap();
        let options = Options::default();
        let cmap = Cmap::from_mappings([('A', font_types::GlyphId::new(1))]).unwrap();
        let bytes = FontBuilder::new().add_table(&cmap).unwrap().build();
        let font = FontRef::new(&bytes).unwrap();
        let names: Vec<GlyphName> = vec![".notdef".into(), "A".into()];
        let loaded = vec![(bytes.as_slice(), font)];
        let cx = MergeContext::new(loaded, vec![names.clone()], names, &options);
        let src = cx.font(crate::types::FontIndex::new(0));
        let Value::CharMap(map) = char_map(src, subtable) else {
            panic!("expected a character map");
        };
        // glyph 9 lies past the end of the font
        assert_eq!(map.into_iter().collect::<Vec<_>>(), vec![(0x41, GlyphName::from("A"))]);
    }
}
