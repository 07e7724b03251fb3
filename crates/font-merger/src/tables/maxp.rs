//! maxp table

use read_fonts::{TableProvider, types::Tag};
use write_fonts::tables::maxp::Maxp;

use crate::{
    Result,
    context::{MergeContext, SourceFont},
    value::{Object, Value},
};

pub const TAG: Tag = Tag::new(b"maxp");

pub fn lift_maxp(src: &SourceFont) -> Result<Option<Value>> {
    let Ok(maxp) = src.font.maxp() else {
        return Ok(None);
    };
    let int = |v: Option<u16>| v.map(i64::from);
    let obj = Object::new("maxp")
        .with("tableTag", TAG)
        .with("tableVersion", u32::from_be_bytes(maxp.version().to_be_bytes()) as i64)
        .with("numGlyphs", maxp.num_glyphs() as i64)
        // version 1.0, TrueType outlines
        .with_opt("maxPoints", int(maxp.max_points()))
        .with_opt("maxContours", int(maxp.max_contours()))
        .with_opt("maxCompositePoints", int(maxp.max_composite_points()))
        .with_opt("maxCompositeContours", int(maxp.max_composite_contours()))
        .with_opt("maxZones", int(maxp.max_zones()))
        .with_opt("maxTwilightPoints", int(maxp.max_twilight_points()))
        .with_opt("maxStorage", int(maxp.max_storage()))
        .with_opt("maxFunctionDefs", int(maxp.max_function_defs()))
        .with_opt("maxInstructionDefs", int(maxp.max_instruction_defs()))
        .with_opt("maxStackElements", int(maxp.max_stack_elements()))
        .with_opt("maxSizeOfInstructions", int(maxp.max_size_of_instructions()))
        .with_opt("maxComponentElements", int(maxp.max_component_elements()))
        .with_opt("maxComponentDepth", int(maxp.max_component_depth()));
    Ok(Some(obj.into()))
}

/// The version follows from which fields are present; numGlyphs is the merged count
pub fn lower_maxp(cx: &MergeContext, obj: &Object) -> Result<Maxp> {
    Ok(Maxp {
        num_glyphs: cx.num_glyphs(),
        max_points: obj.optional("maxPoints")?,
        max_contours: obj.optional("maxContours")?,
        max_composite_points: obj.optional("maxCompositePoints")?,
        max_composite_contours: obj.optional("maxCompositeContours")?,
        max_zones: obj.optional("maxZones")?,
        max_twilight_points: obj.optional("maxTwilightPoints")?,
        max_storage: obj.optional("maxStorage")?,
        max_function_defs: obj.optional("maxFunctionDefs")?,
        max_instruction_defs: obj.optional("maxInstructionDefs")?,
        max_stack_elements: obj.optional("maxStackElements")?,
        max_size_of_instructions: obj.optional("maxSizeOfInstructions")?,
        max_component_elements: obj.optional("maxComponentElements")?,
        max_component_depth: obj.optional("maxComponentDepth")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::tests::empty_context, object_merger::merge_objects};

    fn maxp(num_glyphs: i64, max_points: i64, max_storage: i64) -> Option<Value> {
        Some(
            Object::new("maxp")
                .with("tableTag", TAG)
                .with("tableVersion", 0x10000)
                .with("numGlyphs", num_glyphs)
                .with("maxPoints", max_points)
                .with("maxStorage", max_storage)
                .into(),
        )
    }

    #[test]
    fn test_maxp_rules() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let merged = merge_objects(&mut cx, vec![maxp(3, 40, 8), maxp(5, 90, 64)])
            .unwrap()
            .and_then(Value::into_object)
            .unwrap();
        assert_eq!(merged.int("numGlyphs"), Some(8));
        assert_eq!(merged.int("maxPoints"), Some(90));
        assert_eq!(merged.int("maxStorage"), Some(8));

        let lowered = lower_maxp(&cx, &merged).unwrap();
        assert_eq!(lowered.max_points, Some(90));
        assert_eq!(lowered.max_contours, None);
    }

    #[test]
    fn test_table_versions_must_match() {
        let options = Default::default();
        let mut cx = empty_context(&options);
        let cff = Some(
            Object::new("maxp")
                .with("tableVersion", 0x5000)
                .with("numGlyphs", 2)
                .into(),
        );
        assert!(merge_objects(&mut cx, vec![maxp(3, 40, 8), cff]).is_err());
    }
}
