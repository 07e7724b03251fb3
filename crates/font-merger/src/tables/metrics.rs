//! Horizontal and vertical metrics: hhea/hmtx and vhea/vmtx
//!
//! hmtx and vmtx are lifted as a dictionary from glyph name to
//! `[advance, side bearing]`, so merging is a dictionary union. The long
//! metric counts in hhea and vhea are recalculated when the metrics are
//! written back.

use font_types::{FWord, UfWord};
use read_fonts::{TableProvider, types::Tag};
use write_fonts::tables::{
    hhea::Hhea,
    hmtx::{Hmtx, LongMetric},
    vhea::Vhea,
    vmtx::Vmtx,
};

use super::Lowering;
use crate::{
    Result,
    context::{MergeContext, SourceFont},
    layout::lift::version,
    value::{Object, Value},
};

pub const HHEA: Tag = Tag::new(b"hhea");
pub const HMTX: Tag = Tag::new(b"hmtx");
pub const VHEA: Tag = Tag::new(b"vhea");
pub const VMTX: Tag = Tag::new(b"vmtx");

pub fn lift_hhea(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(hhea) = src.font.hhea() else {
        return Ok(None);
    };
    let obj = Object::new("hhea")
        .with("tableTag", HHEA)
        .with("tableVersion", version(hhea.version()))
        .with("ascent", hhea.ascender().to_i16() as i64)
        .with("descent", hhea.descender().to_i16() as i64)
        .with("lineGap", hhea.line_gap().to_i16() as i64)
        .with("advanceWidthMax", hhea.advance_width_max().to_u16() as i64)
        .with("minLeftSideBearing", hhea.min_left_side_bearing().to_i16() as i64)
        .with("minRightSideBearing", hhea.min_right_side_bearing().to_i16() as i64)
        .with("xMaxExtent", hhea.x_max_extent().to_i16() as i64)
        .with("caretSlopeRise", hhea.caret_slope_rise() as i64)
        .with("caretSlopeRun", hhea.caret_slope_run() as i64)
        .with("caretOffset", hhea.caret_offset() as i64)
        .with("metricDataFormat", hhea.metric_data_format() as i64)
        .with("numberOfHMetrics", hhea.number_of_h_metrics() as i64);
    Ok(Some(obj.into()))
}

pub fn lift_vhea(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(vhea) = src.font.vhea() else {
        return Ok(None);
    };
    let obj = Object::new("vhea")
        .with("tableTag", VHEA)
        .with("tableVersion", u32::from_be_bytes(vhea.version().to_be_bytes()) as i64)
        .with("ascent", vhea.ascender().to_i16() as i64)
        .with("descent", vhea.descender().to_i16() as i64)
        .with("lineGap", vhea.line_gap().to_i16() as i64)
        .with("advanceHeightMax", vhea.advance_height_max().to_u16() as i64)
        .with("minTopSideBearing", vhea.min_top_side_bearing().to_i16() as i64)
        .with("minBottomSideBearing", vhea.min_bottom_side_bearing().to_i16() as i64)
        .with("yMaxExtent", vhea.y_max_extent().to_i16() as i64)
        .with("caretSlopeRise", vhea.caret_slope_rise() as i64)
        .with("caretSlopeRun", vhea.caret_slope_run() as i64)
        .with("caretOffset", vhea.caret_offset() as i64)
        .with("metricDataFormat", vhea.metric_data_format() as i64)
        .with("numberOfVMetrics", vhea.number_of_long_ver_metrics() as i64);
    Ok(Some(obj.into()))
}

pub fn lift_hmtx(src: &SourceFont) -> Result<Option<Value>> {
    let (Ok(hhea), Ok(hmtx)) = (src.font.hhea(), src.font.hmtx()) else {
        return Ok(None);
    };
    let count = hhea.number_of_h_metrics() as usize;
    let long = hmtx
        .h_metrics()
        .iter()
        .take(count)
        .map(|m| (m.advance.get(), m.side_bearing.get()))
        .collect::<Vec<_>>();
    let bearings = hmtx.left_side_bearings().iter().map(|b| b.get()).collect::<Vec<_>>();
    let obj = Object::new("hmtx")
        .with("tableTag", HMTX)
        .with("metrics", metric_dict(src, &long, &bearings));
    Ok(Some(obj.into()))
}

pub fn lift_vmtx(src: &SourceFont) -> Result<Option<Value>> {
    let (Ok(vhea), Ok(vmtx)) = (src.font.vhea(), src.font.vmtx()) else {
        return Ok(None);
    };
    let count = vhea.number_of_long_ver_metrics() as usize;
    let long = vmtx
        .v_metrics()
        .iter()
        .take(count)
        .map(|m| (m.advance.get(), m.side_bearing.get()))
        .collect::<Vec<_>>();
    let bearings = vmtx.top_side_bearings().iter().map(|b| b.get()).collect::<Vec<_>>();
    let obj = Object::new("vmtx")
        .with("tableTag", VMTX)
        .with("metrics", metric_dict(src, &long, &bearings));
    Ok(Some(obj.into()))
}

/// Glyphs past the long metrics repeat the last advance
fn expand(long: &[(u16, i16)], bearings: &[i16], gid: usize) -> (u16, i16) {
    match long.get(gid) {
        Some(metric) => *metric,
        None => {
            let advance = long.last().map(|(advance, _)| *advance).unwrap_or_default();
            (advance, bearings.get(gid - long.len()).copied().unwrap_or_default())
        }
    }
}

fn metric_dict(src: &SourceFont, long: &[(u16, i16)], bearings: &[i16]) -> Value {
    let dict = src
        .glyph_order
        .iter()
        .enumerate()
        .map(|(gid, name)| {
            let (advance, bearing) = expand(long, bearings, gid);
            (name.clone(), Value::List(vec![Value::Int(advance as i64), Value::Int(bearing as i64)]))
        })
        .collect();
    Value::Dict(dict)
}

/// Advance of one source glyph, read straight from the font
pub fn advance(src: &SourceFont, tag: Tag, gid: u16) -> Option<u16> {
    let gid = gid as usize;
    let (long, bearings) = if tag == VMTX {
        let count = src.font.vhea().ok()?.number_of_long_ver_metrics() as usize;
        let vmtx = src.font.vmtx().ok()?;
        let long: Vec<_> =
            vmtx.v_metrics().iter().take(count).map(|m| (m.advance.get(), 0)).collect();
        (long, vmtx.top_side_bearings().iter().map(|b| b.get()).collect::<Vec<_>>())
    } else {
        let count = src.font.hhea().ok()?.number_of_h_metrics() as usize;
        let hmtx = src.font.hmtx().ok()?;
        let long: Vec<_> =
            hmtx.h_metrics().iter().take(count).map(|m| (m.advance.get(), 0)).collect();
        (long, hmtx.left_side_bearings().iter().map(|b| b.get()).collect::<Vec<_>>())
    };
    Some(expand(&long, &bearings, gid).0)
}

/// Metrics in merged glyph order, with the run of equal trailing advances folded
fn lower_metrics(cx: &MergeContext, obj: &Object) -> Result<(Vec<LongMetric>, Vec<i16>)> {
    let dict = obj.dict("metrics").ok_or_else(|| obj.type_mismatch("metrics"))?;
    let pairs = cx
        .glyph_order
        .iter()
        .map(|name| match dict.get(name).and_then(Value::as_list) {
            None => Ok((0, 0)),
            Some([advance, bearing]) => {
                let advance = advance.as_int().and_then(|v| u16::try_from(v).ok());
                let bearing = bearing.as_int().and_then(|v| i16::try_from(v).ok());
                advance.zip(bearing).ok_or_else(|| obj.type_mismatch("metrics"))
            }
            Some(_) => Err(obj.type_mismatch("metrics")),
        })
        .collect::<Result<Vec<(u16, i16)>>>()?;

    let mut long_count = pairs.len();
    while long_count > 1 && pairs[long_count - 1].0 == pairs[long_count - 2].0 {
        long_count -= 1;
    }
    let long = pairs[..long_count]
        .iter()
        .map(|&(advance, side_bearing)| LongMetric { advance, side_bearing })
        .collect();
    let bearings = pairs[long_count..].iter().map(|(_, bearing)| *bearing).collect();
    Ok((long, bearings))
}

pub fn lower_hmtx(cx: &MergeContext, obj: &Object, lowering: &mut Lowering) -> Result<Hmtx> {
    let (h_metrics, left_side_bearings) = lower_metrics(cx, obj)?;
    lowering.h_metric_count = Some(h_metrics.len() as u16);
    Ok(Hmtx { h_metrics, left_side_bearings })
}

pub fn lower_vmtx(cx: &MergeContext, obj: &Object, lowering: &mut Lowering) -> Result<Vmtx> {
    let (v_metrics, top_side_bearings) = lower_metrics(cx, obj)?;
    lowering.v_metric_count = Some(v_metrics.len() as u16);
    Ok(Vmtx { v_metrics, top_side_bearings })
}

pub fn lower_hhea(obj: &Object, lowering: &Lowering) -> Result<Hhea> {
    let number_of_h_metrics = match lowering.h_metric_count {
        Some(count) => count,
        None => obj.optional("numberOfHMetrics")?.unwrap_or_default(),
    };
    Ok(Hhea {
        ascender: FWord::new(obj.require("ascent")?),
        descender: FWord::new(obj.require("descent")?),
        line_gap: FWord::new(obj.require("lineGap")?),
        advance_width_max: UfWord::new(obj.require("advanceWidthMax")?),
        min_left_side_bearing: FWord::new(obj.require("minLeftSideBearing")?),
        min_right_side_bearing: FWord::new(obj.require("minRightSideBearing")?),
        x_max_extent: FWord::new(obj.require("xMaxExtent")?),
        caret_slope_rise: obj.require("caretSlopeRise")?,
        caret_slope_run: obj.require("caretSlopeRun")?,
        caret_offset: obj.require("caretOffset")?,
        number_of_h_metrics,
    })
}

pub fn lower_vhea(obj: &Object, lowering: &Lowering) -> Result<Vhea> {
    let number_of_long_ver_metrics = match lowering.v_metric_count {
        Some(count) => count,
        None => obj.optional("numberOfVMetrics")?.unwrap_or_default(),
    };
    Ok(Vhea {
        ascender: FWord::new(obj.require("ascent")?),
        descender: FWord::new(obj.require("descent")?),
        line_gap: FWord::new(obj.require("lineGap")?),
        advance_height_max: UfWord::new(obj.require("advanceHeightMax")?),
        min_top_side_bearing: FWord::new(obj.require("minTopSideBearing")?),
        min_bottom_side_bearing: FWord::new(obj.require("minBottomSideBearing")?),
        y_max_extent: FWord::new(obj.require("yMaxExtent")?),
        caret_slope_rise: obj.require("caretSlopeRise")?,
        caret_slope_run: obj.require("caretSlopeRun")?,
        caret_offset: obj.require("caretOffset")?,
        number_of_long_ver_metrics,
    })
}
