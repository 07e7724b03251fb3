//! post table
//!
//! The merged table is always version 2.0 so that the unified glyph names,
//! including the `#n` suffixes, survive in the output.

use font_types::{FWord, Fixed};
use read_fonts::{TableProvider, types::Tag};
use write_fonts::tables::post::Post;

use crate::{
    Result,
    context::{MergeContext, SourceFont},
    value::{Object, Value},
};

pub const TAG: Tag = Tag::new(b"post");

pub fn lift_post(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(post) = src.font.post() else {
        return Ok(None);
    };
    let obj = Object::new("post")
        .with("tableTag", TAG)
        .with("formatType", u32::from_be_bytes(post.version().to_be_bytes()) as i64)
        .with("italicAngle", post.italic_angle().to_bits() as i64)
        .with("underlinePosition", post.underline_position().to_i16() as i64)
        .with("underlineThickness", post.underline_thickness().to_i16() as i64)
        .with("isFixedPitch", post.is_fixed_pitch() as i64)
        .with("minMemType42", post.min_mem_type42() as i64)
        .with("maxMemType42", post.max_mem_type42() as i64)
        .with("minMemType1", post.min_mem_type1() as i64)
        .with("maxMemType1", post.max_mem_type1() as i64);
    Ok(Some(obj.into()))
}

pub fn lower_post(cx: &MergeContext, obj: &Object) -> Result<Post> {
    let glyph_names: Vec<&str> = cx.glyph_order.iter().map(|name| name.as_str()).collect();
    let mut post = Post::new_v2(glyph_names);
    post.italic_angle = Fixed::from_bits(obj.require("italicAngle")?);
    post.underline_position = FWord::new(obj.require("underlinePosition")?);
    post.underline_thickness = FWord::new(obj.require("underlineThickness")?);
    post.is_fixed_pitch = obj.require("isFixedPitch")?;
    post.min_mem_type42 = obj.require("minMemType42")?;
    post.max_mem_type42 = obj.require("maxMemType42")?;
    post.min_mem_type1 = obj.require("minMemType1")?;
    post.max_mem_type1 = obj.require("maxMemType1")?;
    Ok(post)
}

#[cfg(test)]
mod tests {
    use read_fonts::{FontData, FontRead, tables::post::Post as ReadPost, types::GlyphId16};

    use super::*;
    use crate::{context::tests::empty_context, object_merger::merge_objects};

    fn post(fixed_pitch: i64, min_mem: i64, max_mem: i64) -> Option<Value> {
        Some(
            Object::new("post")
                .with("tableTag", TAG)
                .with("formatType", 0x30000)
                .with("italicAngle", 0)
                .with("underlinePosition", -100)
                .with("underlineThickness", 50)
                .with("isFixedPitch", fixed_pitch)
                .with("minMemType42", min_mem)
                .with("maxMemType42", max_mem)
                .with("minMemType1", min_mem)
                .with("maxMemType1", max_mem)
                .into(),
        )
    }

    #[test]
    fn test_merge_and_lower_with_names() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        cx.glyph_order = vec![".notdef".into(), "A".into(), "A#1".into()];

        let merged = merge_objects(&mut cx, vec![post(1, 10, 99), post(0, 20, 99)])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("isFixedPitch"), Some(0));
        assert_eq!(merged.int("minMemType42"), Some(20));
        assert_eq!(merged.int("maxMemType42"), Some(0));

        let lowered = lower_post(&cx, &merged).unwrap();
        let bytes = write_fonts::dump_table(&lowered).unwrap();
        let read = ReadPost::read(FontData::new(&bytes)).unwrap();
        assert_eq!(read.glyph_name(GlyphId16::new(2)), Some("A#1"));
        assert_eq!(read.underline_position().to_i16(), -100);
    }
}
