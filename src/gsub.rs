//! Glyph substitution (`GSUB`) subtables.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/gsub>

use crate::binary::read::{ReadArray, ReadBinary, ReadBinaryDep, ReadCtxt};
use crate::binary::U16Be;
use crate::context::{
    read_coverage, ChainedSequenceContext, GlyphTable, Glyph, MatchContext, MatchType,
    OffsetArray, SequenceContext,
};
use crate::error::ParseError;
use crate::gdef::GDEFTable;
use crate::layout::coverage::Coverage;
use crate::layout::{SubstLookupType, GSUB};

#[derive(Copy, Clone, Debug)]
pub enum SingleSubst<'a> {
    Format1 {
        coverage: Coverage<'a>,
        delta_glyph_index: i16,
    },
    Format2 {
        coverage: Coverage<'a>,
        substitute_glyphs: ReadArray<'a, U16Be>,
    },
}

#[derive(Copy, Clone, Debug)]
pub struct MultipleSubst<'a> {
    coverage: Coverage<'a>,
    sequences: OffsetArray<'a, SequenceTable<'a>>,
}

#[derive(Copy, Clone, Debug)]
pub struct SequenceTable<'a> {
    pub substitute_glyphs: ReadArray<'a, U16Be>,
}

#[derive(Copy, Clone, Debug)]
pub struct AlternateSubst<'a> {
    coverage: Coverage<'a>,
    alternate_sets: OffsetArray<'a, AlternateSet<'a>>,
}

#[derive(Copy, Clone, Debug)]
pub struct AlternateSet<'a> {
    pub alternate_glyphs: ReadArray<'a, U16Be>,
}

#[derive(Copy, Clone, Debug)]
pub struct LigatureSubst<'a> {
    coverage: Coverage<'a>,
    ligature_sets: OffsetArray<'a, LigatureSet<'a>>,
}

/// The ligatures starting with one glyph, in order of preference.
pub type LigatureSet<'a> = OffsetArray<'a, Ligature<'a>>;

#[derive(Copy, Clone, Debug)]
pub struct Ligature<'a> {
    pub ligature_glyph: u16,
    /// The components after the first glyph.
    pub component_glyphs: ReadArray<'a, U16Be>,
}

#[derive(Copy, Clone, Debug)]
pub struct ReverseChainSingleSubst<'a> {
    coverage: Coverage<'a>,
    /// Backtrack coverages, nearest glyph first.
    backtrack_coverages: OffsetArray<'a, Coverage<'a>>,
    lookahead_coverages: OffsetArray<'a, Coverage<'a>>,
    substitute_glyphs: ReadArray<'a, U16Be>,
}

/// A `GSUB` lookup subtable, after extension resolution.
#[derive(Copy, Clone, Debug)]
pub enum SubstLookupSubtable<'a> {
    SingleSubst(SingleSubst<'a>),
    MultipleSubst(MultipleSubst<'a>),
    AlternateSubst(AlternateSubst<'a>),
    LigatureSubst(LigatureSubst<'a>),
    ContextSubst(SequenceContext<'a, GSUB>),
    ChainContextSubst(ChainedSequenceContext<'a, GSUB>),
    ReverseChainSingleSubst(ReverseChainSingleSubst<'a>),
}

impl ReadBinary for SingleSubst<'_> {
    type HostType<'a> = SingleSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<SingleSubst<'a>, ParseError> {
        let subtable = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&subtable, ctxt.read_u16be()?)?;
                let delta_glyph_index = ctxt.read_i16be()?;
                Ok(SingleSubst::Format1 {
                    coverage,
                    delta_glyph_index,
                })
            }
            2 => {
                let coverage = read_coverage(&subtable, ctxt.read_u16be()?)?;
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let substitute_glyphs = ctxt.read_array::<U16Be>(glyph_count)?;
                Ok(SingleSubst::Format2 {
                    coverage,
                    substitute_glyphs,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl SingleSubst<'_> {
    pub fn apply_glyph(&self, glyph: u16) -> Result<Option<u16>, ParseError> {
        match *self {
            SingleSubst::Format1 {
                ref coverage,
                delta_glyph_index,
            } => {
                if coverage.contains(glyph) {
                    // Addition of deltaGlyphID is modulo 65536
                    Ok(Some(glyph.wrapping_add(delta_glyph_index as u16)))
                } else {
                    Ok(None)
                }
            }
            SingleSubst::Format2 {
                ref coverage,
                ref substitute_glyphs,
            } => match coverage.glyph_coverage_value(glyph) {
                Some(coverage_index) => substitute_glyphs
                    .item(usize::from(coverage_index))
                    .map(Some),
                None => Ok(None),
            },
        }
    }
}

/// Read a format 1 subtable made of a coverage and one table per covered glyph.
fn read_coverage_indexed<'a, R>(
    ctxt: &mut ReadCtxt<'a>,
) -> Result<(Coverage<'a>, OffsetArray<'a, R>), ParseError> {
    let scope = ctxt.scope();
    match ctxt.read_u16be()? {
        1 => {
            let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
            let count = usize::from(ctxt.read_u16be()?);
            let offsets = ctxt.read_array::<U16Be>(count)?;
            Ok((coverage, OffsetArray::new(scope, offsets)))
        }
        _ => Err(ParseError::BadVersion),
    }
}

/// The table for the coverage index of `glyph`, `None` when `glyph` is not covered.
fn coverage_indexed<'a, R: ReadBinaryDep<Args<'a> = ()>>(
    coverage: &Coverage<'a>,
    tables: &OffsetArray<'a, R>,
    glyph: u16,
) -> Result<Option<R::HostType<'a>>, ParseError> {
    match coverage.glyph_coverage_value(glyph) {
        Some(coverage_index) => tables.get_required(usize::from(coverage_index)).map(Some),
        None => Ok(None),
    }
}

impl ReadBinary for MultipleSubst<'_> {
    type HostType<'a> = MultipleSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<MultipleSubst<'a>, ParseError> {
        let (coverage, sequences) = read_coverage_indexed(ctxt)?;
        Ok(MultipleSubst {
            coverage,
            sequences,
        })
    }
}

impl<'a> MultipleSubst<'a> {
    pub fn apply_glyph(&self, glyph: u16) -> Result<Option<SequenceTable<'a>>, ParseError> {
        coverage_indexed(&self.coverage, &self.sequences, glyph)
    }
}

impl ReadBinary for SequenceTable<'_> {
    type HostType<'a> = SequenceTable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<SequenceTable<'a>, ParseError> {
        // Empty sequences are disallowed but occur in fonts, so they are accepted.
        let glyph_count = usize::from(ctxt.read_u16be()?);
        let substitute_glyphs = ctxt.read_array::<U16Be>(glyph_count)?;
        Ok(SequenceTable { substitute_glyphs })
    }
}

impl ReadBinary for AlternateSubst<'_> {
    type HostType<'a> = AlternateSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<AlternateSubst<'a>, ParseError> {
        let (coverage, alternate_sets) = read_coverage_indexed(ctxt)?;
        Ok(AlternateSubst {
            coverage,
            alternate_sets,
        })
    }
}

impl<'a> AlternateSubst<'a> {
    pub fn apply_glyph(&self, glyph: u16) -> Result<Option<AlternateSet<'a>>, ParseError> {
        coverage_indexed(&self.coverage, &self.alternate_sets, glyph)
    }
}

impl ReadBinary for AlternateSet<'_> {
    type HostType<'a> = AlternateSet<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<AlternateSet<'a>, ParseError> {
        let glyph_count = usize::from(ctxt.read_u16be()?);
        ctxt.check(glyph_count > 0)?;
        let alternate_glyphs = ctxt.read_array::<U16Be>(glyph_count)?;
        Ok(AlternateSet { alternate_glyphs })
    }
}

impl ReadBinary for LigatureSubst<'_> {
    type HostType<'a> = LigatureSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<LigatureSubst<'a>, ParseError> {
        let (coverage, ligature_sets) = read_coverage_indexed(ctxt)?;
        Ok(LigatureSubst {
            coverage,
            ligature_sets,
        })
    }
}

impl<'a> LigatureSubst<'a> {
    pub fn apply_glyph(&self, glyph: u16) -> Result<Option<LigatureSet<'a>>, ParseError> {
        coverage_indexed(&self.coverage, &self.ligature_sets, glyph)
    }

    /// The first ligature whose components are `glyphs`, including the first glyph.
    pub fn find_ligature(&self, glyphs: &[u16]) -> Result<Option<Ligature<'a>>, ParseError> {
        let (first, rest) = match glyphs.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };
        let ligature_set = match self.apply_glyph(*first)? {
            Some(ligature_set) => ligature_set,
            None => return Ok(None),
        };
        for ligature in ligature_set.iter() {
            let ligature = ligature?;
            if ligature.matches(rest) {
                return Ok(Some(ligature));
            }
        }
        Ok(None)
    }
}

impl ReadBinary for Ligature<'_> {
    type HostType<'a> = Ligature<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Ligature<'a>, ParseError> {
        let ligature_glyph = ctxt.read_u16be()?;
        let component_count = usize::from(ctxt.read_u16be()?);
        ctxt.check(component_count > 0)?;
        let component_glyphs = ctxt.read_array::<U16Be>(component_count - 1)?;
        Ok(Ligature {
            ligature_glyph,
            component_glyphs,
        })
    }
}

impl Ligature<'_> {
    /// Whether the components after the first glyph are exactly `glyphs`.
    pub fn matches(&self, glyphs: &[u16]) -> bool {
        self.component_glyphs.len() == glyphs.len()
            && self.component_glyphs.iter().zip(glyphs).all(|(a, &b)| a == b)
    }
}

impl ReadBinary for ReverseChainSingleSubst<'_> {
    type HostType<'a> = ReverseChainSingleSubst<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ReverseChainSingleSubst<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let backtrack_count = usize::from(ctxt.read_u16be()?);
                let backtrack_offsets = ctxt.read_array::<U16Be>(backtrack_count)?;
                let lookahead_count = usize::from(ctxt.read_u16be()?);
                let lookahead_offsets = ctxt.read_array::<U16Be>(lookahead_count)?;
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let substitute_glyphs = ctxt.read_array::<U16Be>(glyph_count)?;
                ctxt.check(coverage.glyph_count() == glyph_count)?;
                Ok(ReverseChainSingleSubst {
                    coverage,
                    backtrack_coverages: OffsetArray::new(scope, backtrack_offsets),
                    lookahead_coverages: OffsetArray::new(scope, lookahead_offsets),
                    substitute_glyphs,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl ReverseChainSingleSubst<'_> {
    /// The substitute for `glyph` when `f` accepts the surrounding context.
    pub fn apply_glyph(
        &self,
        glyph: u16,
        mut f: impl FnMut(&MatchContext<'_>) -> Result<bool, ParseError>,
    ) -> Result<Option<u16>, ParseError> {
        match self.coverage.glyph_coverage_value(glyph) {
            Some(coverage_index) => {
                let match_context = MatchContext {
                    backtrack_table: GlyphTable::ByCoverage(self.backtrack_coverages),
                    input_table: GlyphTable::Empty,
                    lookahead_table: GlyphTable::ByCoverage(self.lookahead_coverages),
                };
                if f(&match_context)? {
                    self.substitute_glyphs
                        .item(usize::from(coverage_index))
                        .map(Some)
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    pub fn apply_at<G: Glyph>(
        &self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        match_type: MatchType,
        glyphs: &[G],
        index: usize,
    ) -> Result<Option<u16>, ParseError> {
        match glyphs.get(index) {
            Some(glyph) => self.apply_glyph(glyph.get_glyph_index(), |match_context| {
                match_context.matches(opt_gdef_table, match_type, glyphs, index)
            }),
            None => Ok(None),
        }
    }
}

impl ReadBinaryDep for SubstLookupSubtable<'_> {
    type Args<'a> = SubstLookupType;
    type HostType<'a> = SubstLookupSubtable<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        lookup_type: SubstLookupType,
    ) -> Result<SubstLookupSubtable<'a>, ParseError> {
        match lookup_type {
            SubstLookupType::SingleSubst => ctxt
                .read::<SingleSubst<'_>>()
                .map(SubstLookupSubtable::SingleSubst),
            SubstLookupType::MultipleSubst => ctxt
                .read::<MultipleSubst<'_>>()
                .map(SubstLookupSubtable::MultipleSubst),
            SubstLookupType::AlternateSubst => ctxt
                .read::<AlternateSubst<'_>>()
                .map(SubstLookupSubtable::AlternateSubst),
            SubstLookupType::LigatureSubst => ctxt
                .read::<LigatureSubst<'_>>()
                .map(SubstLookupSubtable::LigatureSubst),
            SubstLookupType::ContextSubst => ctxt
                .read::<SequenceContext<'_, GSUB>>()
                .map(SubstLookupSubtable::ContextSubst),
            SubstLookupType::ChainContextSubst => ctxt
                .read::<ChainedSequenceContext<'_, GSUB>>()
                .map(SubstLookupSubtable::ChainContextSubst),
            SubstLookupType::ReverseChainSingleSubst => ctxt
                .read::<ReverseChainSingleSubst<'_>>()
                .map(SubstLookupSubtable::ReverseChainSingleSubst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::tests::writer::{TtfType::*, Writer};

    #[test]
    fn single_subst_delta_wraps() {
        let mut w = Writer::new();
        w.write_all(&[UInt16(1), UInt16(6), Int16(2)]);
        w.u16s(&[1, 2, 5, 0xFFFF]);
        let single_subst = ReadScope::new(&w.data).read::<SingleSubst<'_>>().unwrap();
        assert_eq!(single_subst.apply_glyph(5), Ok(Some(7)));
        assert_eq!(single_subst.apply_glyph(0xFFFF), Ok(Some(1)));
        assert_eq!(single_subst.apply_glyph(6), Ok(None));
    }

    #[test]
    fn single_subst_format2() {
        let mut w = Writer::new();
        w.u16s(&[2, 10, 2, 100, 101]);
        w.u16s(&[2, 1, 3, 5, 0]);
        let single_subst = ReadScope::new(&w.data).read::<SingleSubst<'_>>().unwrap();
        assert_eq!(single_subst.apply_glyph(4), Ok(Some(101)));
        assert_eq!(single_subst.apply_glyph(6), Ok(None));
        // Coverage index 2 is past the substitute array.
        assert_eq!(single_subst.apply_glyph(5), Err(ParseError::BadIndex));
    }

    #[test]
    fn multiple_and_alternate_subst() {
        let mut w = Writer::new();
        w.u16s(&[1, 10, 2, 18, 24]);
        w.u16s(&[1, 2, 1, 2]);
        w.u16s(&[2, 40, 41]);
        w.u16s(&[0]);
        let multiple_subst = ReadScope::new(&w.data).read::<MultipleSubst<'_>>().unwrap();
        let sequence = multiple_subst.apply_glyph(1).unwrap().unwrap();
        assert_eq!(sequence.substitute_glyphs.to_vec(), vec![40, 41]);
        let sequence = multiple_subst.apply_glyph(2).unwrap().unwrap();
        assert!(sequence.substitute_glyphs.is_empty());
        assert!(multiple_subst.apply_glyph(3).unwrap().is_none());

        // The same bytes as alternates reject the empty set.
        let alternate_subst = ReadScope::new(&w.data).read::<AlternateSubst<'_>>().unwrap();
        let alternate_set = alternate_subst.apply_glyph(1).unwrap().unwrap();
        assert_eq!(alternate_set.alternate_glyphs.to_vec(), vec![40, 41]);
        assert_eq!(
            alternate_subst.apply_glyph(2).err(),
            Some(ParseError::BadValue)
        );
    }

    #[test]
    fn ligature_subst() {
        let mut w = Writer::new();
        w.u16s(&[1, 8, 1, 14]);
        w.u16s(&[1, 1, 30]);
        // ligature set: "ffi" before "ff"
        w.u16s(&[2, 6, 14]);
        w.u16s(&[300, 3, 30, 31]);
        w.u16s(&[301, 2, 30]);
        let ligature_subst = ReadScope::new(&w.data).read::<LigatureSubst<'_>>().unwrap();
        let glyph = |glyphs: &[u16]| {
            ligature_subst
                .find_ligature(glyphs)
                .unwrap()
                .map(|ligature| ligature.ligature_glyph)
        };
        assert_eq!(glyph(&[30, 30, 31]), Some(300));
        assert_eq!(glyph(&[30, 30]), Some(301));
        assert_eq!(glyph(&[30, 31]), None);
        assert_eq!(glyph(&[]), None);
        assert_eq!(ligature_subst.apply_glyph(30).unwrap().unwrap().len(), 2);
    }

    #[test]
    fn reverse_chain_single_subst() {
        let mut w = Writer::new();
        w.write(UInt16(1));
        let coverage_at = w.placeholder_u16();
        w.write(UInt16(1));
        let backtrack_at = w.placeholder_u16();
        w.write(UInt16(0));
        w.u16s(&[1, 200]);
        w.patch_offset16(coverage_at, 0);
        w.u16s(&[1, 1, 20]);
        w.patch_offset16(backtrack_at, 0);
        w.u16s(&[1, 1, 10]);

        let subtable = ReadScope::new(&w.data)
            .read_dep::<SubstLookupSubtable<'_>>(SubstLookupType::ReverseChainSingleSubst)
            .unwrap();
        let reverse_chain = match subtable {
            SubstLookupSubtable::ReverseChainSingleSubst(reverse_chain) => reverse_chain,
            _ => panic!("expected reverse chaining subtable"),
        };
        let apply = |glyphs: &[u16], index| {
            reverse_chain
                .apply_at(None, MatchType::ignore_marks(), glyphs, index)
                .unwrap()
        };
        assert_eq!(apply(&[10, 20], 1), Some(200));
        assert_eq!(apply(&[11, 20], 1), None);
        assert_eq!(apply(&[20], 0), None);
    }

    #[test]
    fn reverse_chain_substitute_count_must_match_coverage() {
        let mut w = Writer::new();
        w.u16s(&[1, 14, 0, 0, 2, 200, 201]);
        w.u16s(&[1, 1, 20]);
        assert_eq!(
            ReadScope::new(&w.data)
                .read::<ReverseChainSingleSubst<'_>>()
                .err(),
            Some(ParseError::BadValue)
        );
    }
}
