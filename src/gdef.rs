//! `GDEF` glyph definition table.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/gdef>
//!
//! Only the parts consulted when matching glyph sequences are read: the glyph class definitions,
//! the mark attachment classes and the mark glyph sets.

use crate::binary::read::{ReadArray, ReadBinary, ReadCtxt, ReadScope};
use crate::binary::U32Be;
use crate::error::ParseError;
use crate::layout::coverage::{ClassDef, Coverage};
use crate::layout::read_optional;

pub const GLYPH_CLASS_NONE: u16 = 0;
pub const GLYPH_CLASS_BASE: u16 = 1;
pub const GLYPH_CLASS_LIGATURE: u16 = 2;
pub const GLYPH_CLASS_MARK: u16 = 3;
pub const GLYPH_CLASS_COMPONENT: u16 = 4;

#[derive(Clone, Debug)]
pub struct GDEFTable<'a> {
    pub major_version: u16,
    pub minor_version: u16,
    pub opt_glyph_classdef: Option<ClassDef<'a>>,
    pub attach_list_offset: u16,
    pub lig_caret_list_offset: u16,
    pub opt_mark_attach_classdef: Option<ClassDef<'a>>,
    pub opt_mark_glyph_sets: Option<MarkGlyphSets<'a>>,
    /// Offset of the item variation store (version 1.3), which is not parsed here.
    pub item_var_store_offset: Option<u32>,
}

/// Sets of mark glyphs referenced by lookups that use a mark filtering set.
#[derive(Copy, Clone, Debug)]
pub struct MarkGlyphSets<'a> {
    scope: ReadScope<'a>,
    coverage_offsets: ReadArray<'a, U32Be>,
}

impl ReadBinary for GDEFTable<'_> {
    type HostType<'a> = GDEFTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<GDEFTable<'a>, ParseError> {
        let table = ctxt.scope();

        let major_version = ctxt.read_u16be()?;
        let minor_version = ctxt.read_u16be()?;
        ctxt.check_version(major_version == 1)?;

        let glyph_classdef_offset = usize::from(ctxt.read_u16be()?);
        let attach_list_offset = ctxt.read_u16be()?;
        let lig_caret_list_offset = ctxt.read_u16be()?;
        let mark_attach_classdef_offset = usize::from(ctxt.read_u16be()?);
        let mark_glyph_sets_offset = if minor_version >= 2 {
            usize::from(ctxt.read_u16be()?)
        } else {
            0
        };
        let item_var_store_offset = if minor_version >= 3 {
            Some(ctxt.read_u32be()?).filter(|&offset| offset != 0)
        } else {
            None
        };

        let opt_glyph_classdef = read_optional::<ClassDef<'_>>(&table, glyph_classdef_offset)?;
        let opt_mark_attach_classdef =
            read_optional::<ClassDef<'_>>(&table, mark_attach_classdef_offset)?;
        let opt_mark_glyph_sets =
            read_optional::<MarkGlyphSets<'_>>(&table, mark_glyph_sets_offset)?;

        Ok(GDEFTable {
            major_version,
            minor_version,
            opt_glyph_classdef,
            attach_list_offset,
            lig_caret_list_offset,
            opt_mark_attach_classdef,
            opt_mark_glyph_sets,
            item_var_store_offset,
        })
    }
}

impl<'a> GDEFTable<'a> {
    /// The glyph class of `glyph`, `GLYPH_CLASS_NONE` when unclassified.
    pub fn glyph_class(&self, glyph: u16) -> u16 {
        self.opt_glyph_classdef
            .as_ref()
            .map_or(GLYPH_CLASS_NONE, |classdef| classdef.glyph_class_value(glyph))
    }

    pub fn is_mark(&self, glyph: u16) -> bool {
        self.glyph_class(glyph) == GLYPH_CLASS_MARK
    }

    pub fn mark_attach_class(&self, glyph: u16) -> u16 {
        self.opt_mark_attach_classdef
            .as_ref()
            .map_or(GLYPH_CLASS_NONE, |classdef| classdef.glyph_class_value(glyph))
    }

    /// Whether `glyph` is in mark glyph set `set_index`.
    ///
    /// A table without mark glyph sets, or a set index past the end, is `MissingValue`.
    pub fn mark_set_contains(&self, set_index: u16, glyph: u16) -> Result<bool, ParseError> {
        match &self.opt_mark_glyph_sets {
            Some(mark_glyph_sets) => mark_glyph_sets.contains(set_index, glyph),
            None => Err(ParseError::MissingValue),
        }
    }
}

impl ReadBinary for MarkGlyphSets<'_> {
    type HostType<'a> = MarkGlyphSets<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<MarkGlyphSets<'a>, ParseError> {
        let scope = ctxt.scope();
        let format = ctxt.read_u16be()?;
        ctxt.check_version(format == 1)?;
        let mark_glyph_set_count = usize::from(ctxt.read_u16be()?);
        let coverage_offsets = ctxt.read_array::<U32Be>(mark_glyph_set_count)?;
        Ok(MarkGlyphSets {
            scope,
            coverage_offsets,
        })
    }
}

impl<'a> MarkGlyphSets<'a> {
    pub fn len(&self) -> usize {
        self.coverage_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coverage_offsets.is_empty()
    }

    pub fn coverage(&self, set_index: u16) -> Result<Coverage<'a>, ParseError> {
        let offset = self
            .coverage_offsets
            .get_item(usize::from(set_index))
            .ok_or(ParseError::MissingValue)?;
        let offset = usize::try_from(offset)?;
        self.scope.offset_checked(offset)?.read::<Coverage<'_>>()
    }

    pub fn contains(&self, set_index: u16, glyph: u16) -> Result<bool, ParseError> {
        Ok(self.coverage(set_index)?.contains(glyph))
    }
}

/// The glyph class of `glyph` in an optional GDEF table.
pub fn glyph_class(opt_gdef_table: Option<&GDEFTable<'_>>, glyph: u16) -> u16 {
    opt_gdef_table.map_or(GLYPH_CLASS_NONE, |gdef| gdef.glyph_class(glyph))
}

pub fn gdef_is_mark(opt_gdef_table: Option<&GDEFTable<'_>>, glyph: u16) -> bool {
    glyph_class(opt_gdef_table, glyph) == GLYPH_CLASS_MARK
}

pub fn mark_attach_class(opt_gdef_table: Option<&GDEFTable<'_>>, glyph: u16) -> u16 {
    opt_gdef_table.map_or(GLYPH_CLASS_NONE, |gdef| gdef.mark_attach_class(glyph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::writer::{TtfType::*, Writer};

    fn gdef_1_2() -> Vec<u8> {
        let mut w = Writer::new();
        w.u16s(&[1, 2]);
        let glyph_classdef_at = w.placeholder_u16();
        w.u16s(&[0, 0]);
        let mark_attach_classdef_at = w.placeholder_u16();
        let mark_glyph_sets_at = w.placeholder_u16();

        w.patch_offset16(glyph_classdef_at, 0);
        // glyphs 10..=12 are base, base, mark
        w.u16s(&[1, 10, 3, GLYPH_CLASS_BASE, GLYPH_CLASS_BASE, GLYPH_CLASS_MARK]);

        w.patch_offset16(mark_attach_classdef_at, 0);
        w.u16s(&[2, 1, 12, 12, 5]);

        w.patch_offset16(mark_glyph_sets_at, 0);
        w.write_all(&[UInt16(1), UInt16(1), UInt32(8)]);
        w.u16s(&[1, 1, 12]);
        w.data
    }

    #[test]
    fn reads_version_1_2() {
        let data = gdef_1_2();
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert_eq!(gdef.glyph_class(10), GLYPH_CLASS_BASE);
        assert!(gdef.is_mark(12));
        assert!(!gdef.is_mark(13));
        assert_eq!(gdef.mark_attach_class(12), 5);
        assert_eq!(gdef.mark_set_contains(0, 12), Ok(true));
        assert_eq!(gdef.mark_set_contains(0, 11), Ok(false));
        assert_eq!(
            gdef.mark_set_contains(1, 12),
            Err(ParseError::MissingValue)
        );
        assert_eq!(gdef.item_var_store_offset, None);
        assert!(gdef_is_mark(Some(&gdef), 12));
        assert_eq!(glyph_class(None, 12), GLYPH_CLASS_NONE);
    }

    #[test]
    fn version_1_0_has_no_mark_sets() {
        let data = [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let gdef = ReadScope::new(&data).read::<GDEFTable<'_>>().unwrap();
        assert!(gdef.opt_mark_glyph_sets.is_none());
        assert_eq!(
            gdef.mark_set_contains(0, 1),
            Err(ParseError::MissingValue)
        );
    }

    #[test]
    fn offset_past_end() {
        let data = [0, 1, 0, 0, 0, 64, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            ReadScope::new(&data).read::<GDEFTable<'_>>().err(),
            Some(ParseError::BadOffset)
        );
    }
}
