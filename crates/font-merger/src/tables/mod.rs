//! Per-table lifting into merge objects and lowering back to binary tables

pub mod cmap;
pub mod glyf;
pub mod head;
pub mod maxp;
pub mod metrics;
pub mod os2;
pub mod post;
pub mod raw;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::warn;
use read_fonts::types::Tag;
use write_fonts::{dump_table, tables::loca::LocaFormat};

use crate::{
    Result,
    context::{MergeContext, SourceFont},
    layout::{
        GPOS, GSUB, LayoutArena, base,
        gdef::{self, lift_gdef},
        lift::{lift_header_only, lift_layout},
        lower::{lower_gpos, lower_gsub},
    },
    value::{Object, Value},
};

/// Values computed while writing one table that another table records
#[derive(Debug, Default)]
pub struct Lowering {
    pub loca_format: Option<LocaFormat>,
    pub h_metric_count: Option<u16>,
    pub v_metric_count: Option<u16>,
}

/// Lift one table of a source font, `None` when the font lacks it or the
/// table is not merged at all
pub fn lift_table(src: &SourceFont, tag: Tag, arena: &mut LayoutArena) -> Result<Option<Value>> {
    match &tag.to_be_bytes() {
        b"head" => head::lift_head(src),
        b"hhea" => metrics::lift_hhea(src),
        b"vhea" => metrics::lift_vhea(src),
        b"hmtx" => metrics::lift_hmtx(src),
        b"vmtx" => metrics::lift_vmtx(src),
        b"maxp" => maxp::lift_maxp(src),
        b"OS/2" => os2::lift_os2(src),
        b"post" => post::lift_post(src),
        b"cmap" => cmap::lift_cmap(src),
        b"glyf" => glyf::lift_glyf(src),
        b"loca" => Ok(src
            .font
            .table_data(tag)
            .map(|_| Object::new("loca").with("tableTag", tag).into())),
        b"GDEF" => lift_gdef(src),
        b"GSUB" | b"GPOS" => lift_layout(src, arena, tag),
        b"BASE" => base::lift_base(src),
        b"JSTF" => lift_header_only(src, tag, "JSTF"),
        b"MATH" => lift_header_only(src, tag, "MATH"),
        _ => raw::lift_raw(src, tag),
    }
}

/// Serialize every merged table
///
/// glyf goes first since head records its loca format, and the metrics go
/// before their headers for the same reason. Tables in the drop list are
/// lowered but left out of the result.
pub fn lower_tables(
    cx: &MergeContext,
    merged: &IndexMap<Tag, Object>,
) -> Result<BTreeMap<Tag, Vec<u8>>> {
    let mut lowering = Lowering::default();
    let mut out = BTreeMap::new();

    if let Some(obj) = merged.get(&glyf::TAG) {
        let (glyf_table, loca, format) = glyf::lower_glyf(cx, obj)?;
        lowering.loca_format = Some(format);
        out.insert(glyf::TAG, dump_table(&glyf_table)?);
        out.insert(glyf::LOCA, dump_table(&loca)?);
    }
    if let Some(obj) = merged.get(&metrics::HMTX) {
        let hmtx = metrics::lower_hmtx(cx, obj, &mut lowering)?;
        out.insert(metrics::HMTX, dump_table(&hmtx)?);
    }
    if let Some(obj) = merged.get(&metrics::VMTX) {
        let vmtx = metrics::lower_vmtx(cx, obj, &mut lowering)?;
        out.insert(metrics::VMTX, dump_table(&vmtx)?);
    }

    for (tag, obj) in merged {
        if out.contains_key(tag) || *tag == glyf::LOCA {
            continue;
        }
        let bytes = match &tag.to_be_bytes() {
            b"head" => dump_table(&head::lower_head(obj, &lowering)?)?,
            b"hhea" => dump_table(&metrics::lower_hhea(obj, &lowering)?)?,
            b"vhea" => dump_table(&metrics::lower_vhea(obj, &lowering)?)?,
            b"maxp" => dump_table(&maxp::lower_maxp(cx, obj)?)?,
            b"OS/2" => dump_table(&os2::lower_os2(obj)?)?,
            b"post" => dump_table(&post::lower_post(cx, obj)?)?,
            b"cmap" => dump_table(&cmap::lower_cmap(cx, obj)?)?,
            b"GDEF" => dump_table(&gdef::lower_gdef(cx, obj)?)?,
            b"GSUB" => dump_table(&lower_gsub(cx, obj)?)?,
            b"GPOS" => dump_table(&lower_gpos(cx, obj)?)?,
            b"BASE" => dump_table(&base::lower_base(cx, obj)?)?,
            b"JSTF" | b"MATH" => {
                warn!("Dropped '{tag}': the merged table cannot be written");
                continue;
            }
            _ => match raw::lower_raw(*tag, obj) {
                Some(bytes) => bytes,
                None => {
                    warn!("Dropped '{tag}': nothing to write");
                    continue;
                }
            },
        };
        out.insert(*tag, bytes);
    }

    out.retain(|tag, _| !cx.options.should_drop_tag(*tag));
    Ok(out)
}

/// Layout tables whose indices are resolved before merging
pub fn is_indexed_layout(tag: Tag) -> bool {
    tag == GSUB || tag == GPOS
}
