//! glyf table (TrueType outlines)
//!
//! Outlines are lifted into a dictionary keyed by unified glyph name, with
//! composite components referring to their base glyphs by name. Lowering
//! resolves those names against the merged glyph order and rebuilds `loca`.
//!
//! Per-glyph instructions survive only for the first font: `fpgm` and `cvt `
//! come from that font, so instructions from the others would call into the
//! wrong functions and control values.

use std::collections::{HashMap, HashSet};

use font_types::GlyphId16;
use indexmap::IndexMap;
use log::warn;
use read_fonts::{
    FontData, FontRead, TableProvider,
    tables::glyf::{Anchor as ReadAnchor, CurvePoint, Glyph as ReadGlyph},
    types::{GlyphId as ReadGlyphId, Tag},
};
use write_fonts::{
    dump_table,
    tables::{
        glyf::{
            Anchor, Bbox, Component, ComponentFlags, CompositeGlyph, Contour, Glyf,
            GlyfLocaBuilder, Glyph, SimpleGlyph, Transform,
        },
        loca::{Loca, LocaFormat},
    },
};

use crate::{
    Result,
    context::{MergeContext, SourceFont},
    glyph_order::GlyphName,
    object_merger::merge_objects,
    value::{Object, Value},
};

pub const TAG: Tag = Tag::new(b"glyf");
pub const LOCA: Tag = Tag::new(b"loca");

/// A glyph outline with components addressed by name
#[derive(Clone, Debug, PartialEq)]
pub enum Outline {
    Empty,
    Simple(SimpleGlyph),
    Composite { bbox: Bbox, components: Vec<(GlyphName, Component)>, instructions: Vec<u8> },
}

impl Outline {
    fn strip_instructions(&mut self) {
        match self {
            Outline::Simple(simple) => simple.instructions.clear(),
            Outline::Composite { instructions, .. } => instructions.clear(),
            Outline::Empty => {}
        }
    }
}

pub fn lift_glyf(src: &SourceFont) -> Result<Option<Value>> {
    let (Ok(glyf), Ok(loca)) = (src.font.glyf(), src.font.loca(None)) else {
        return Ok(None);
    };
    let mut glyphs = IndexMap::with_capacity(src.glyph_order.len());
    for (gid, name) in src.glyph_order.iter().enumerate() {
        let outline = match loca.get_glyf(ReadGlyphId::new(gid as u32), &glyf) {
            Ok(Some(glyph)) => lift_outline(src, &glyph)?,
            Ok(None) => Outline::Empty,
            Err(e) => {
                warn!("{}: unreadable outline for '{name}': {e}", src.index);
                Outline::Empty
            }
        };
        glyphs.insert(name.clone(), Value::Outline(Box::new(outline)));
    }
    let order = src.glyph_order.iter().cloned().map(Value::Glyph).collect();
    let obj = Object::new("glyf")
        .with("tableTag", TAG)
        .with("glyphs", Value::Dict(glyphs))
        .with("glyphOrder", Value::List(order));
    Ok(Some(obj.into()))
}

fn lift_outline(src: &SourceFont, glyph: &ReadGlyph) -> Result<Outline> {
    match glyph {
        ReadGlyph::Simple(simple) => {
            let mut points = simple.points();
            let mut start = 0usize;
            let mut contours: Vec<Contour> = Vec::new();
            for end in simple.end_pts_of_contours() {
                let end = end.get() as usize;
                let contour: Vec<CurvePoint> = points
                    .by_ref()
                    .take((end + 1).saturating_sub(start))
                    .map(|pt| CurvePoint { x: pt.x, y: pt.y, on_curve: pt.on_curve })
                    .collect();
                start = end + 1;
                contours.push(contour.into());
            }
            Ok(Outline::Simple(SimpleGlyph {
                bbox: Bbox {
                    x_min: simple.x_min(),
                    y_min: simple.y_min(),
                    x_max: simple.x_max(),
                    y_max: simple.y_max(),
                },
                contours,
                instructions: simple.instructions().to_vec(),
            }))
        }
        ReadGlyph::Composite(composite) => {
            let mut components = Vec::new();
            for comp in composite.components() {
                let name = src.require_name(comp.glyph.to_u32())?;
                let anchor = match comp.anchor {
                    ReadAnchor::Offset { x, y } => Anchor::Offset { x, y },
                    ReadAnchor::Point { base, component } => Anchor::Point { base, component },
                };
                let component = Component {
                    glyph: GlyphId16::NOTDEF,
                    anchor,
                    transform: Transform {
                        xx: comp.transform.xx,
                        yx: comp.transform.yx,
                        xy: comp.transform.xy,
                        yy: comp.transform.yy,
                    },
                    flags: ComponentFlags::from(comp.flags),
                };
                components.push((name, component));
            }
            if components.is_empty() {
                return Ok(Outline::Empty);
            }
            let bbox = Bbox {
                x_min: composite.x_min(),
                y_min: composite.y_min(),
                x_max: composite.x_max(),
                y_max: composite.y_max(),
            };
            let instructions = composite.instructions().unwrap_or_default().to_vec();
            Ok(Outline::Composite { bbox, components, instructions })
        }
    }
}

/// Strip instructions from every font but the first, then union the glyphs
pub fn merge_glyf(cx: &mut MergeContext, mut tables: Vec<Option<Value>>) -> Result<Option<Value>> {
    for table in tables.iter_mut().skip(1).flatten() {
        let Some(Value::Dict(glyphs)) = table.as_object_mut().and_then(|t| t.get_mut("glyphs"))
        else {
            continue;
        };
        for outline in glyphs.values_mut() {
            if let Value::Outline(outline) = outline {
                outline.strip_instructions();
            }
        }
    }
    merge_objects(cx, tables)
}

/// Build glyf and loca in merged glyph order
///
/// Glyphs missing from the merged dictionary are written empty. A composite
/// that references an empty or unknown glyph is written empty too, since
/// such composites are rejected by font sanitizers.
pub fn lower_glyf(cx: &MergeContext, obj: &Object) -> Result<(Glyf, Loca, LocaFormat)> {
    let glyphs = obj.dict("glyphs").ok_or_else(|| obj.type_mismatch("glyphs"))?;
    let outline = |name: &GlyphName| match glyphs.get(name) {
        Some(Value::Outline(outline)) => Some(outline.as_ref()),
        _ => None,
    };
    let positions: HashMap<&GlyphName, u16> =
        cx.glyph_order.iter().enumerate().map(|(i, name)| (name, i as u16)).collect();
    let empty: HashSet<&GlyphName> = cx
        .glyph_order
        .iter()
        .filter(|name| matches!(outline(name), None | Some(Outline::Empty)))
        .collect();

    let mut builder = GlyfLocaBuilder::new();
    for name in &cx.glyph_order {
        let glyph = match outline(name) {
            Some(Outline::Simple(simple)) => Glyph::Simple(simple.clone()),
            Some(Outline::Composite { bbox, components, instructions }) => {
                match lower_composite(*bbox, components, &positions, &empty) {
                    Some(composite) => Glyph::Composite(
                        with_instructions(&composite, instructions).unwrap_or_else(|| {
                            warn!("Dropped instructions of composite '{name}'");
                            composite
                        }),
                    ),
                    None => Glyph::Empty,
                }
            }
            Some(Outline::Empty) | None => Glyph::Empty,
        };
        let added = builder.add_glyph(&glyph).map(|_| ()).map_err(|e| e.to_string());
        if let Err(e) = added {
            warn!("Writing '{name}' as an empty glyph: {e}");
            let _ = builder.add_glyph(&Glyph::Empty);
        }
    }
    Ok(builder.build())
}

fn lower_composite(
    bbox: Bbox,
    components: &[(GlyphName, Component)],
    positions: &HashMap<&GlyphName, u16>,
    empty: &HashSet<&GlyphName>,
) -> Option<CompositeGlyph> {
    let mut resolved = components.iter().map(|(name, component)| {
        let gid = positions.get(name).filter(|_| !empty.contains(name))?;
        Some(Component { glyph: GlyphId16::new(*gid), ..component.clone() })
    });
    let mut composite = CompositeGlyph::new(resolved.next()??, bbox);
    for component in resolved {
        composite.add_component(component?, bbox);
    }
    Some(composite)
}

const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;
const WE_HAVE_INSTRUCTIONS: u16 = 0x0100;

/// Attach instructions to a composite glyph
///
/// write-fonts only sets composite instructions when reading a glyph, so the
/// composite is written out, its last component flagged and the program
/// appended, then read back. `None` if the bytes don't walk as expected.
fn with_instructions(composite: &CompositeGlyph, instructions: &[u8]) -> Option<CompositeGlyph> {
    if instructions.is_empty() {
        return Some(composite.clone());
    }
    let len = u16::try_from(instructions.len()).ok()?;
    let mut bytes = dump_table(composite).ok()?;
    // xMin..yMax follow numberOfContours
    let mut pos = 10;
    loop {
        let flags = u16::from_be_bytes(bytes.get(pos..pos + 2)?.try_into().ok()?);
        if flags & MORE_COMPONENTS == 0 {
            bytes[pos..pos + 2].copy_from_slice(&(flags | WE_HAVE_INSTRUCTIONS).to_be_bytes());
            let end = pos + component_len(flags);
            bytes.truncate(end);
            break;
        }
        pos += component_len(flags);
    }
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(instructions);
    CompositeGlyph::read(FontData::new(&bytes)).ok()
}

/// Size of one component record, flags included
fn component_len(flags: u16) -> usize {
    let args = if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
    let transform = if flags & WE_HAVE_A_SCALE != 0 {
        2
    } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
        4
    } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
        8
    } else {
        0
    };
    4 + args + transform
}
