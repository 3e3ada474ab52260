//! Sequence context and chained sequence context subtables, shared by `GSUB` (types 5 and 6) and
//! `GPOS` (types 7 and 8), and the glyph sequence matching they rely on.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#sequence-context-format-1-simple-glyph-contexts>
//!
//! Matching a rule yields its sequence lookup records. Applying the referenced lookups is up to
//! the caller.

use std::marker::PhantomData;

use crate::binary::read::{ReadArray, ReadBinary, ReadBinaryDep, ReadCtxt, ReadFrom, ReadScope};
use crate::binary::U16Be;
use crate::error::ParseError;
use crate::gdef::{self, GDEFTable, GLYPH_CLASS_BASE, GLYPH_CLASS_LIGATURE, GLYPH_CLASS_MARK};
use crate::layout::coverage::{ClassDef, Coverage};
use crate::layout::{read_optional, read_required, LayoutTableType, Lookup, LookupFlag, LookupList};

/// A glyph in a sequence being matched.
pub trait Glyph {
    fn get_glyph_index(&self) -> u16;
}

impl Glyph for u16 {
    fn get_glyph_index(&self) -> u16 {
        *self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequenceLookupRecord {
    /// Index into the input sequence, the first glyph being 0.
    pub sequence_index: u16,
    pub lookup_list_index: u16,
}

impl ReadFrom for SequenceLookupRecord {
    type ReadType = (U16Be, U16Be);

    fn read_from((sequence_index, lookup_list_index): (u16, u16)) -> Self {
        SequenceLookupRecord {
            sequence_index,
            lookup_list_index,
        }
    }
}

/// A count followed by 16-bit offsets to tables of type `R`, relative to the start of the count,
/// each read when requested.
#[derive(Copy, Clone, Debug)]
pub struct OffsetArray<'a, R> {
    scope: ReadScope<'a>,
    offsets: ReadArray<'a, U16Be>,
    phantom: PhantomData<fn() -> R>,
}

pub type SequenceRuleSet<'a> = OffsetArray<'a, SequenceRule<'a>>;
pub type ChainedSequenceRuleSet<'a> = OffsetArray<'a, ChainedSequenceRule<'a>>;

/// Rule with glyph ids (format 1) or class values (format 2).
#[derive(Copy, Clone, Debug)]
pub struct SequenceRule<'a> {
    /// The input sequence after the first glyph.
    pub input_sequence: ReadArray<'a, U16Be>,
    pub lookup_records: ReadArray<'a, SequenceLookupRecord>,
}

/// Chained rule with glyph ids (format 1) or class values (format 2).
///
/// The backtrack sequence is stored nearest glyph first.
#[derive(Copy, Clone, Debug)]
pub struct ChainedSequenceRule<'a> {
    pub backtrack_sequence: ReadArray<'a, U16Be>,
    /// The input sequence after the first glyph.
    pub input_sequence: ReadArray<'a, U16Be>,
    pub lookahead_sequence: ReadArray<'a, U16Be>,
    pub lookup_records: ReadArray<'a, SequenceLookupRecord>,
}

#[derive(Copy, Clone, Debug)]
pub enum SequenceContext<'a, T: LayoutTableType> {
    Format1 {
        coverage: Coverage<'a>,
        rule_sets: OffsetArray<'a, SequenceRuleSet<'a>>,
        phantom: PhantomData<T>,
    },
    Format2 {
        coverage: Coverage<'a>,
        classdef: ClassDef<'a>,
        class_sets: OffsetArray<'a, SequenceRuleSet<'a>>,
        phantom: PhantomData<T>,
    },
    Format3 {
        coverages: OffsetArray<'a, Coverage<'a>>,
        lookup_records: ReadArray<'a, SequenceLookupRecord>,
        phantom: PhantomData<T>,
    },
}

#[derive(Copy, Clone, Debug)]
pub enum ChainedSequenceContext<'a, T: LayoutTableType> {
    Format1 {
        coverage: Coverage<'a>,
        rule_sets: OffsetArray<'a, ChainedSequenceRuleSet<'a>>,
        phantom: PhantomData<T>,
    },
    Format2 {
        coverage: Coverage<'a>,
        backtrack_classdef: ClassDef<'a>,
        input_classdef: ClassDef<'a>,
        lookahead_classdef: ClassDef<'a>,
        class_sets: OffsetArray<'a, ChainedSequenceRuleSet<'a>>,
        phantom: PhantomData<T>,
    },
    Format3 {
        backtrack_coverages: OffsetArray<'a, Coverage<'a>>,
        input_coverages: OffsetArray<'a, Coverage<'a>>,
        lookahead_coverages: OffsetArray<'a, Coverage<'a>>,
        lookup_records: ReadArray<'a, SequenceLookupRecord>,
        phantom: PhantomData<T>,
    },
}

/// How glyphs in a sequence are compared against a rule.
#[derive(Copy, Clone, Debug)]
pub enum GlyphTable<'a> {
    Empty,
    ById(ReadArray<'a, U16Be>),
    ByClassDef(ClassDef<'a>, ReadArray<'a, U16Be>),
    ByCoverage(OffsetArray<'a, Coverage<'a>>),
}

#[derive(Copy, Clone, Debug)]
pub struct MatchContext<'a> {
    pub backtrack_table: GlyphTable<'a>,
    pub input_table: GlyphTable<'a>,
    pub lookahead_table: GlyphTable<'a>,
}

/// A rule whose context was accepted, with the lookups it applies.
#[derive(Copy, Clone, Debug)]
pub struct ContextMatch<'a, T: LayoutTableType> {
    pub match_context: MatchContext<'a>,
    pub lookup_records: ReadArray<'a, SequenceLookupRecord>,
    phantom: PhantomData<T>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IgnoreMarks {
    NoIgnoreMarks,
    IgnoreAllMarks,
    /// Ignore marks whose mark attachment class differs from this one.
    IgnoreMarksExcept(u16),
    /// Ignore marks outside this GDEF mark glyph set.
    IgnoreMarksNotInSet(u16),
}

/// Which glyphs are skipped when matching a sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatchType {
    ignore_bases: bool,
    ignore_ligatures: bool,
    ignore_marks: IgnoreMarks,
}

impl<'a, R> OffsetArray<'a, R> {
    pub(crate) fn new(scope: ReadScope<'a>, offsets: ReadArray<'a, U16Be>) -> Self {
        OffsetArray {
            scope,
            offsets,
            phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// The array without its first `count` entries.
    fn skip(&self, count: usize) -> Result<Self, ParseError> {
        let length = self.len().checked_sub(count).ok_or(ParseError::BadIndex)?;
        Ok(OffsetArray::new(self.scope, self.offsets.subarray(count, length)?))
    }
}

impl<'a, R: ReadBinaryDep<Args<'a> = ()>> OffsetArray<'a, R> {
    /// The table at `index`, `None` when its offset is null.
    pub fn get(&self, index: usize) -> Result<Option<R::HostType<'a>>, ParseError> {
        let offset = self.offsets.item(index)?;
        read_optional::<R>(&self.scope, usize::from(offset))
    }

    /// The table at `index`, which must be present.
    pub fn get_required(&self, index: usize) -> Result<R::HostType<'a>, ParseError> {
        self.get(index)?.ok_or(ParseError::MissingValue)
    }

    /// The present tables in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<R::HostType<'a>, ParseError>> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index).transpose())
    }
}

impl<R> ReadBinary for OffsetArray<'_, R> {
    type HostType<'a> = OffsetArray<'a, R>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<OffsetArray<'a, R>, ParseError> {
        let scope = ctxt.scope();
        let count = usize::from(ctxt.read_u16be()?);
        let offsets = ctxt.read_array::<U16Be>(count)?;
        Ok(OffsetArray::new(scope, offsets))
    }
}

/// Read an input glyph count, which includes the first glyph so it must be at least 1.
fn read_input_count(ctxt: &mut ReadCtxt<'_>) -> Result<usize, ParseError> {
    let input_glyph_count = usize::from(ctxt.read_u16be()?);
    ctxt.check(input_glyph_count > 0)?;
    Ok(input_glyph_count)
}

impl ReadBinary for SequenceRule<'_> {
    type HostType<'a> = SequenceRule<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<SequenceRule<'a>, ParseError> {
        let input_glyph_count = read_input_count(ctxt)?;
        let seq_lookup_count = usize::from(ctxt.read_u16be()?);
        let input_sequence = ctxt.read_array::<U16Be>(input_glyph_count - 1)?;
        let lookup_records = ctxt.read_array::<SequenceLookupRecord>(seq_lookup_count)?;
        Ok(SequenceRule {
            input_sequence,
            lookup_records,
        })
    }
}

impl ReadBinary for ChainedSequenceRule<'_> {
    type HostType<'a> = ChainedSequenceRule<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ChainedSequenceRule<'a>, ParseError> {
        // Each count follows the array sized by the previous one.
        let backtrack_glyph_count = usize::from(ctxt.read_u16be()?);
        let backtrack_sequence = ctxt.read_array::<U16Be>(backtrack_glyph_count)?;
        let input_glyph_count = read_input_count(ctxt)?;
        let input_sequence = ctxt.read_array::<U16Be>(input_glyph_count - 1)?;
        let lookahead_glyph_count = usize::from(ctxt.read_u16be()?);
        let lookahead_sequence = ctxt.read_array::<U16Be>(lookahead_glyph_count)?;
        let seq_lookup_count = usize::from(ctxt.read_u16be()?);
        let lookup_records = ctxt.read_array::<SequenceLookupRecord>(seq_lookup_count)?;
        Ok(ChainedSequenceRule {
            backtrack_sequence,
            input_sequence,
            lookahead_sequence,
            lookup_records,
        })
    }
}

pub(crate) fn read_coverage<'a>(
    scope: &ReadScope<'a>,
    offset: u16,
) -> Result<Coverage<'a>, ParseError> {
    read_required::<Coverage<'_>>(scope, usize::from(offset))
}

/// A null class definition offset puts every glyph in class 0.
pub(crate) fn read_classdef<'a>(
    scope: &ReadScope<'a>,
    offset: u16,
) -> Result<ClassDef<'a>, ParseError> {
    Ok(read_optional::<ClassDef<'_>>(scope, usize::from(offset))?.unwrap_or_else(ClassDef::empty))
}

impl<T: LayoutTableType> ReadBinary for SequenceContext<'_, T> {
    type HostType<'a> = SequenceContext<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<SequenceContext<'a, T>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let rule_set_count = usize::from(ctxt.read_u16be()?);
                let rule_set_offsets = ctxt.read_array::<U16Be>(rule_set_count)?;
                Ok(SequenceContext::Format1 {
                    coverage,
                    rule_sets: OffsetArray::new(scope, rule_set_offsets),
                    phantom: PhantomData,
                })
            }
            2 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let classdef = read_classdef(&scope, ctxt.read_u16be()?)?;
                let class_set_count = usize::from(ctxt.read_u16be()?);
                let class_set_offsets = ctxt.read_array::<U16Be>(class_set_count)?;
                Ok(SequenceContext::Format2 {
                    coverage,
                    classdef,
                    class_sets: OffsetArray::new(scope, class_set_offsets),
                    phantom: PhantomData,
                })
            }
            3 => {
                let glyph_count = read_input_count(ctxt)?;
                let seq_lookup_count = usize::from(ctxt.read_u16be()?);
                let coverage_offsets = ctxt.read_array::<U16Be>(glyph_count)?;
                let lookup_records = ctxt.read_array::<SequenceLookupRecord>(seq_lookup_count)?;
                Ok(SequenceContext::Format3 {
                    coverages: OffsetArray::new(scope, coverage_offsets),
                    lookup_records,
                    phantom: PhantomData,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<T: LayoutTableType> ReadBinary for ChainedSequenceContext<'_, T> {
    type HostType<'a> = ChainedSequenceContext<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ChainedSequenceContext<'a, T>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let rule_set_count = usize::from(ctxt.read_u16be()?);
                let rule_set_offsets = ctxt.read_array::<U16Be>(rule_set_count)?;
                Ok(ChainedSequenceContext::Format1 {
                    coverage,
                    rule_sets: OffsetArray::new(scope, rule_set_offsets),
                    phantom: PhantomData,
                })
            }
            2 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let backtrack_classdef = read_classdef(&scope, ctxt.read_u16be()?)?;
                let input_classdef = read_classdef(&scope, ctxt.read_u16be()?)?;
                let lookahead_classdef = read_classdef(&scope, ctxt.read_u16be()?)?;
                let class_set_count = usize::from(ctxt.read_u16be()?);
                let class_set_offsets = ctxt.read_array::<U16Be>(class_set_count)?;
                Ok(ChainedSequenceContext::Format2 {
                    coverage,
                    backtrack_classdef,
                    input_classdef,
                    lookahead_classdef,
                    class_sets: OffsetArray::new(scope, class_set_offsets),
                    phantom: PhantomData,
                })
            }
            3 => {
                let backtrack_glyph_count = usize::from(ctxt.read_u16be()?);
                let backtrack_offsets = ctxt.read_array::<U16Be>(backtrack_glyph_count)?;
                let input_glyph_count = read_input_count(ctxt)?;
                let input_offsets = ctxt.read_array::<U16Be>(input_glyph_count)?;
                let lookahead_glyph_count = usize::from(ctxt.read_u16be()?);
                let lookahead_offsets = ctxt.read_array::<U16Be>(lookahead_glyph_count)?;
                let seq_lookup_count = usize::from(ctxt.read_u16be()?);
                let lookup_records = ctxt.read_array::<SequenceLookupRecord>(seq_lookup_count)?;
                Ok(ChainedSequenceContext::Format3 {
                    backtrack_coverages: OffsetArray::new(scope, backtrack_offsets),
                    input_coverages: OffsetArray::new(scope, input_offsets),
                    lookahead_coverages: OffsetArray::new(scope, lookahead_offsets),
                    lookup_records,
                    phantom: PhantomData,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

/// The rule set for `index`, or `None` for an index past the end or a null offset, both of which
/// mean there are no rules.
fn rule_set<'a, R>(
    sets: &OffsetArray<'a, OffsetArray<'a, R>>,
    index: usize,
) -> Result<Option<OffsetArray<'a, R>>, ParseError> {
    if index < sets.len() {
        sets.get(index)
    } else {
        Ok(None)
    }
}

impl<'a, T: LayoutTableType> SequenceContext<'a, T> {
    /// Find the first rule for `glyph` whose context `f` accepts.
    pub fn find_match(
        &self,
        glyph: u16,
        mut f: impl FnMut(&MatchContext<'a>) -> Result<bool, ParseError>,
    ) -> Result<Option<ContextMatch<'a, T>>, ParseError> {
        match self {
            SequenceContext::Format1 {
                coverage,
                rule_sets,
                ..
            } => {
                let coverage_index = match coverage.glyph_coverage_value(glyph) {
                    Some(index) => usize::from(index),
                    None => return Ok(None),
                };
                let rule_set = match rule_set(rule_sets, coverage_index)? {
                    Some(rule_set) => rule_set,
                    None => return Ok(None),
                };
                for rule in rule_set.iter() {
                    let rule = rule?;
                    let match_context = MatchContext {
                        backtrack_table: GlyphTable::Empty,
                        input_table: GlyphTable::ById(rule.input_sequence),
                        lookahead_table: GlyphTable::Empty,
                    };
                    if f(&match_context)? {
                        return Ok(Some(ContextMatch::new(match_context, rule.lookup_records)));
                    }
                }
                Ok(None)
            }
            SequenceContext::Format2 {
                coverage,
                classdef,
                class_sets,
                ..
            } => {
                if !coverage.contains(glyph) {
                    return Ok(None);
                }
                let class_value = usize::from(classdef.glyph_class_value(glyph));
                let class_set = match rule_set(class_sets, class_value)? {
                    Some(class_set) => class_set,
                    None => return Ok(None),
                };
                for rule in class_set.iter() {
                    let rule = rule?;
                    let match_context = MatchContext {
                        backtrack_table: GlyphTable::Empty,
                        input_table: GlyphTable::ByClassDef(*classdef, rule.input_sequence),
                        lookahead_table: GlyphTable::Empty,
                    };
                    if f(&match_context)? {
                        return Ok(Some(ContextMatch::new(match_context, rule.lookup_records)));
                    }
                }
                Ok(None)
            }
            SequenceContext::Format3 {
                coverages,
                lookup_records,
                ..
            } => {
                if !coverages.get_required(0)?.contains(glyph) {
                    return Ok(None);
                }
                let match_context = MatchContext {
                    backtrack_table: GlyphTable::Empty,
                    input_table: GlyphTable::ByCoverage(coverages.skip(1)?),
                    lookahead_table: GlyphTable::Empty,
                };
                if f(&match_context)? {
                    Ok(Some(ContextMatch::new(match_context, *lookup_records)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Match the rules against `glyphs` at `index`, returning the first that applies.
    pub fn apply_at<G: Glyph>(
        &self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        match_type: MatchType,
        glyphs: &[G],
        index: usize,
    ) -> Result<Option<ContextMatch<'a, T>>, ParseError> {
        match glyphs.get(index) {
            Some(glyph) => self.find_match(glyph.get_glyph_index(), |match_context| {
                match_context.matches(opt_gdef_table, match_type, glyphs, index)
            }),
            None => Ok(None),
        }
    }
}

impl<'a, T: LayoutTableType> ChainedSequenceContext<'a, T> {
    /// Find the first rule for `glyph` whose context `f` accepts.
    pub fn find_match(
        &self,
        glyph: u16,
        mut f: impl FnMut(&MatchContext<'a>) -> Result<bool, ParseError>,
    ) -> Result<Option<ContextMatch<'a, T>>, ParseError> {
        match self {
            ChainedSequenceContext::Format1 {
                coverage,
                rule_sets,
                ..
            } => {
                let coverage_index = match coverage.glyph_coverage_value(glyph) {
                    Some(index) => usize::from(index),
                    None => return Ok(None),
                };
                let rule_set = match rule_set(rule_sets, coverage_index)? {
                    Some(rule_set) => rule_set,
                    None => return Ok(None),
                };
                for rule in rule_set.iter() {
                    let rule = rule?;
                    let match_context = MatchContext {
                        backtrack_table: GlyphTable::ById(rule.backtrack_sequence),
                        input_table: GlyphTable::ById(rule.input_sequence),
                        lookahead_table: GlyphTable::ById(rule.lookahead_sequence),
                    };
                    if f(&match_context)? {
                        return Ok(Some(ContextMatch::new(match_context, rule.lookup_records)));
                    }
                }
                Ok(None)
            }
            ChainedSequenceContext::Format2 {
                coverage,
                backtrack_classdef,
                input_classdef,
                lookahead_classdef,
                class_sets,
                ..
            } => {
                if !coverage.contains(glyph) {
                    return Ok(None);
                }
                let class_value = usize::from(input_classdef.glyph_class_value(glyph));
                let class_set = match rule_set(class_sets, class_value)? {
                    Some(class_set) => class_set,
                    None => return Ok(None),
                };
                for rule in class_set.iter() {
                    let rule = rule?;
                    let match_context = MatchContext {
                        backtrack_table: GlyphTable::ByClassDef(
                            *backtrack_classdef,
                            rule.backtrack_sequence,
                        ),
                        input_table: GlyphTable::ByClassDef(*input_classdef, rule.input_sequence),
                        lookahead_table: GlyphTable::ByClassDef(
                            *lookahead_classdef,
                            rule.lookahead_sequence,
                        ),
                    };
                    if f(&match_context)? {
                        return Ok(Some(ContextMatch::new(match_context, rule.lookup_records)));
                    }
                }
                Ok(None)
            }
            ChainedSequenceContext::Format3 {
                backtrack_coverages,
                input_coverages,
                lookahead_coverages,
                lookup_records,
                ..
            } => {
                if !input_coverages.get_required(0)?.contains(glyph) {
                    return Ok(None);
                }
                let match_context = MatchContext {
                    backtrack_table: GlyphTable::ByCoverage(*backtrack_coverages),
                    input_table: GlyphTable::ByCoverage(input_coverages.skip(1)?),
                    lookahead_table: GlyphTable::ByCoverage(*lookahead_coverages),
                };
                if f(&match_context)? {
                    Ok(Some(ContextMatch::new(match_context, *lookup_records)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Match the rules against `glyphs` at `index`, returning the first that applies.
    pub fn apply_at<G: Glyph>(
        &self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        match_type: MatchType,
        glyphs: &[G],
        index: usize,
    ) -> Result<Option<ContextMatch<'a, T>>, ParseError> {
        match glyphs.get(index) {
            Some(glyph) => self.find_match(glyph.get_glyph_index(), |match_context| {
                match_context.matches(opt_gdef_table, match_type, glyphs, index)
            }),
            None => Ok(None),
        }
    }
}

impl<'a, T: LayoutTableType> ContextMatch<'a, T> {
    fn new(
        match_context: MatchContext<'a>,
        lookup_records: ReadArray<'a, SequenceLookupRecord>,
    ) -> Self {
        ContextMatch {
            match_context,
            lookup_records,
            phantom: PhantomData,
        }
    }

    /// The lookups to apply, paired with the input sequence index they apply at.
    pub fn nested_lookups<'b>(
        &'b self,
        lookup_list: &'b LookupList<'a, T>,
    ) -> impl Iterator<Item = Result<(u16, Lookup<'a, T>), ParseError>> + 'b {
        self.lookup_records.iter().map(move |record| {
            let lookup = lookup_list.lookup(record.lookup_list_index)?;
            Ok((record.sequence_index, lookup))
        })
    }
}

impl GlyphTable<'_> {
    pub fn len(&self) -> usize {
        match self {
            GlyphTable::Empty => 0,
            GlyphTable::ById(sequence) => sequence.len(),
            GlyphTable::ByClassDef(_, sequence) => sequence.len(),
            GlyphTable::ByCoverage(coverages) => coverages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `glyph` satisfies entry `i` of this table.
    fn check(&self, i: usize, glyph: u16) -> Result<bool, ParseError> {
        match self {
            GlyphTable::Empty => Ok(false),
            GlyphTable::ById(sequence) => Ok(sequence.item(i)? == glyph),
            GlyphTable::ByClassDef(classdef, sequence) => {
                Ok(classdef.glyph_class_value(glyph) == sequence.item(i)?)
            }
            GlyphTable::ByCoverage(coverages) => Ok(coverages.get_required(i)?.contains(glyph)),
        }
    }
}

impl MatchType {
    pub fn ignore_marks() -> MatchType {
        MatchType {
            ignore_bases: false,
            ignore_ligatures: false,
            ignore_marks: IgnoreMarks::IgnoreAllMarks,
        }
    }

    pub fn marks_only() -> MatchType {
        MatchType {
            ignore_bases: true,
            ignore_ligatures: true,
            ignore_marks: IgnoreMarks::NoIgnoreMarks,
        }
    }

    /// The skipping behaviour requested by a lookup flag. `IGNORE_MARKS` takes precedence over a
    /// mark filtering set, which takes precedence over the mark attachment type.
    pub fn from_lookup_flag(lookup_flag: LookupFlag, mark_filtering_set: Option<u16>) -> MatchType {
        let ignore_marks = if lookup_flag.contains(LookupFlag::IGNORE_MARKS) {
            IgnoreMarks::IgnoreAllMarks
        } else if let (true, Some(set_index)) = (
            lookup_flag.contains(LookupFlag::USE_MARK_FILTERING_SET),
            mark_filtering_set,
        ) {
            IgnoreMarks::IgnoreMarksNotInSet(set_index)
        } else if lookup_flag.mark_attachment_type() != 0 {
            IgnoreMarks::IgnoreMarksExcept(lookup_flag.mark_attachment_type())
        } else {
            IgnoreMarks::NoIgnoreMarks
        };
        MatchType {
            ignore_bases: lookup_flag.contains(LookupFlag::IGNORE_BASE_GLYPHS),
            ignore_ligatures: lookup_flag.contains(LookupFlag::IGNORE_LIGATURES),
            ignore_marks,
        }
    }

    pub fn from_lookup<T: LayoutTableType>(lookup: &Lookup<'_, T>) -> MatchType {
        MatchType::from_lookup_flag(lookup.lookup_flag(), lookup.mark_filtering_set())
    }

    pub fn match_glyph<G: Glyph>(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        glyph: &G,
    ) -> Result<bool, ParseError> {
        if !self.ignore_bases
            && !self.ignore_ligatures
            && self.ignore_marks == IgnoreMarks::NoIgnoreMarks
        {
            // fast path that doesn't require checking glyph_class
            return Ok(true);
        }
        let glyph_index = glyph.get_glyph_index();
        let glyph_class = gdef::glyph_class(opt_gdef_table, glyph_index);
        if self.ignore_bases && glyph_class == GLYPH_CLASS_BASE {
            return Ok(false);
        }
        if self.ignore_ligatures && glyph_class == GLYPH_CLASS_LIGATURE {
            return Ok(false);
        }
        if glyph_class != GLYPH_CLASS_MARK {
            return Ok(true);
        }
        match (self.ignore_marks, opt_gdef_table) {
            (IgnoreMarks::NoIgnoreMarks, _) => Ok(true),
            (IgnoreMarks::IgnoreAllMarks, _) => Ok(false),
            (IgnoreMarks::IgnoreMarksExcept(keep_class), _) => {
                Ok(gdef::mark_attach_class(opt_gdef_table, glyph_index) == keep_class)
            }
            (IgnoreMarks::IgnoreMarksNotInSet(set_index), Some(gdef_table)) => {
                gdef_table.mark_set_contains(set_index, glyph_index)
            }
            (IgnoreMarks::IgnoreMarksNotInSet(_), None) => Err(ParseError::MissingValue),
        }
    }

    // searches backwards from glyphs[index-1]
    pub fn find_prev<G: Glyph>(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        glyphs: &[G],
        mut index: usize,
    ) -> Result<Option<usize>, ParseError> {
        while index > 0 {
            index -= 1;
            if self.match_glyph(opt_gdef_table, &glyphs[index])? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    // searches forwards from glyphs[index+1]
    pub fn find_next<G: Glyph>(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        glyphs: &[G],
        mut index: usize,
    ) -> Result<Option<usize>, ParseError> {
        while index + 1 < glyphs.len() {
            index += 1;
            if self.match_glyph(opt_gdef_table, &glyphs[index])? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    // searches backwards from glyphs[index-1]
    fn match_back<G: Glyph>(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        glyph_table: &GlyphTable<'_>,
        glyphs: &[G],
        mut index: usize,
    ) -> Result<bool, ParseError> {
        for i in 0..glyph_table.len() {
            match self.find_prev(opt_gdef_table, glyphs, index)? {
                Some(prev_index) => {
                    index = prev_index;
                    if !glyph_table.check(i, glyphs[index].get_glyph_index())? {
                        return Ok(false);
                    }
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    // searches forwards from glyphs[index+1], returning the index of the last glyph matched
    fn match_front<G: Glyph>(
        self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        glyph_table: &GlyphTable<'_>,
        glyphs: &[G],
        mut index: usize,
    ) -> Result<Option<usize>, ParseError> {
        for i in 0..glyph_table.len() {
            match self.find_next(opt_gdef_table, glyphs, index)? {
                Some(next_index) => {
                    index = next_index;
                    if !glyph_table.check(i, glyphs[index].get_glyph_index())? {
                        return Ok(None);
                    }
                }
                None => return Ok(None),
            }
        }
        Ok(Some(index))
    }
}

impl<'a> MatchContext<'a> {
    /// Whether the context matches `glyphs` with the first input glyph at `index`.
    pub fn matches<G: Glyph>(
        &self,
        opt_gdef_table: Option<&GDEFTable<'_>>,
        match_type: MatchType,
        glyphs: &[G],
        index: usize,
    ) -> Result<bool, ParseError> {
        if index >= glyphs.len()
            || !match_type.match_back(opt_gdef_table, &self.backtrack_table, glyphs, index)?
        {
            return Ok(false);
        }
        match match_type.match_front(opt_gdef_table, &self.input_table, glyphs, index)? {
            Some(last_index) => Ok(match_type
                .match_front(opt_gdef_table, &self.lookahead_table, glyphs, last_index)?
                .is_some()),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::GSUB;
    use crate::tests::writer::{TtfType::*, Writer};

    fn coverage(w: &mut Writer, glyphs: &[u16]) {
        w.u16s(&[1, glyphs.len() as u16]);
        w.u16s(glyphs);
    }

    #[test]
    fn chained_rule_counts_are_read_in_order() {
        let mut w = Writer::new();
        w.u16s(&[1, 10]); // backtrack count, backtrack
        w.u16s(&[3, 21, 22]); // input count, input after the first glyph
        w.u16s(&[0]); // lookahead count
        w.u16s(&[2, 0, 5, 2, 9]); // lookup count, records
        assert_eq!(w.offset(), 22);

        let rule = ReadScope::new(&w.data)
            .read::<ChainedSequenceRule<'_>>()
            .unwrap();
        assert_eq!(rule.backtrack_sequence.to_vec(), vec![10]);
        assert_eq!(rule.input_sequence.to_vec(), vec![21, 22]);
        assert!(rule.lookahead_sequence.is_empty());
        assert_eq!(
            rule.lookup_records.to_vec(),
            vec![
                SequenceLookupRecord {
                    sequence_index: 0,
                    lookup_list_index: 5
                },
                SequenceLookupRecord {
                    sequence_index: 2,
                    lookup_list_index: 9
                },
            ]
        );

        // Dropping the final record byte leaves the record array short.
        assert_eq!(
            ReadScope::new(&w.data[..21])
                .read::<ChainedSequenceRule<'_>>()
                .err(),
            Some(ParseError::BadEof)
        );
    }

    #[test]
    fn zero_input_count_is_invalid() {
        assert_eq!(
            ReadScope::new(&[0, 0, 0, 0, 0, 0, 0, 0])
                .read::<ChainedSequenceRule<'_>>()
                .err(),
            Some(ParseError::BadValue)
        );
        assert_eq!(
            ReadScope::new(&[0, 0, 0, 0])
                .read::<SequenceRule<'_>>()
                .err(),
            Some(ParseError::BadValue)
        );
        assert_eq!(
            ReadScope::new(&[0, 3, 0, 0, 0, 0])
                .read::<SequenceContext<'_, GSUB>>()
                .err(),
            Some(ParseError::BadValue)
        );
    }

    /// Chained format 1: coverage [20], one rule with backtrack [10], input [20, 21, 22].
    fn chained_format1() -> Vec<u8> {
        let mut w = Writer::new();
        w.write(UInt16(1));
        let coverage_at = w.placeholder_u16();
        w.write(UInt16(1));
        let rule_set_at = w.placeholder_u16();
        w.patch_offset16(coverage_at, 0);
        coverage(&mut w, &[20]);
        w.patch_offset16(rule_set_at, 0);
        let rule_set = w.offset();
        w.write(UInt16(1));
        let rule_at = w.placeholder_u16();
        w.patch_offset16(rule_at, rule_set);
        w.u16s(&[1, 10, 3, 21, 22, 0, 1, 1, 4]);
        w.data
    }

    #[test]
    fn chained_format1_apply() {
        let data = chained_format1();
        let context = ReadScope::new(&data)
            .read::<ChainedSequenceContext<'_, GSUB>>()
            .unwrap();
        let glyphs: [u16; 5] = [10, 20, 21, 22, 30];
        let found = context
            .apply_at(None, MatchType::ignore_marks(), &glyphs, 1)
            .unwrap()
            .unwrap();
        assert_eq!(
            found.lookup_records.to_vec(),
            vec![SequenceLookupRecord {
                sequence_index: 1,
                lookup_list_index: 4
            }]
        );
        // Wrong backtrack, uncovered glyph, and a truncated input sequence.
        let no_match = |glyphs: &[u16], index| {
            context
                .apply_at(None, MatchType::ignore_marks(), glyphs, index)
                .unwrap()
                .is_none()
        };
        assert!(no_match(&[11, 20, 21, 22], 1));
        assert!(no_match(&glyphs, 2));
        assert!(no_match(&[10, 20, 21], 1));
        assert!(no_match(&glyphs, 9));
    }

    /// GDEF classifying glyph 50 as a mark in attachment class 1 and in mark set 0, and glyph
    /// 51 as a mark in attachment class 2.
    fn gdef() -> Vec<u8> {
        let mut w = Writer::new();
        w.u16s(&[1, 2]);
        let glyph_classdef_at = w.placeholder_u16();
        w.u16s(&[0, 0]);
        let mark_attach_classdef_at = w.placeholder_u16();
        let mark_glyph_sets_at = w.placeholder_u16();
        w.patch_offset16(glyph_classdef_at, 0);
        w.u16s(&[1, 50, 2, 3, 3]);
        w.patch_offset16(mark_attach_classdef_at, 0);
        w.u16s(&[1, 50, 2, 1, 2]);
        w.patch_offset16(mark_glyph_sets_at, 0);
        w.write_all(&[UInt16(1), UInt16(1), UInt32(8)]);
        coverage(&mut w, &[50]);
        w.data
    }

    #[test]
    fn skips_ignored_marks() {
        let data = chained_format1();
        let context = ReadScope::new(&data)
            .read::<ChainedSequenceContext<'_, GSUB>>()
            .unwrap();
        let gdef_data = gdef();
        let gdef = ReadScope::new(&gdef_data)
            .read::<GDEFTable<'_>>()
            .unwrap();
        let glyphs: [u16; 6] = [10, 50, 20, 21, 51, 22];

        let all_marks = MatchType::from_lookup_flag(LookupFlag::IGNORE_MARKS, None);
        assert!(context
            .apply_at(Some(&gdef), all_marks, &glyphs, 2)
            .unwrap()
            .is_some());

        let no_skip = MatchType::from_lookup_flag(LookupFlag::empty(), None);
        assert!(context
            .apply_at(Some(&gdef), no_skip, &glyphs, 2)
            .unwrap()
            .is_none());

        // Only marks of attachment class 1 are kept, so 50 blocks the backtrack.
        let attach_class = MatchType::from_lookup_flag(LookupFlag::from_bits_retain(0x0100), None);
        assert!(context
            .apply_at(Some(&gdef), attach_class, &glyphs, 2)
            .unwrap()
            .is_none());

        // Mark set 0 only holds 50, which again blocks the backtrack.
        let mark_set = MatchType::from_lookup_flag(LookupFlag::USE_MARK_FILTERING_SET, Some(0));
        assert!(context
            .apply_at(Some(&gdef), mark_set, &glyphs, 2)
            .unwrap()
            .is_none());
        assert!(mark_set.match_glyph(Some(&gdef), &51).map(|kept| !kept).unwrap());
        assert_eq!(
            MatchType::from_lookup_flag(LookupFlag::USE_MARK_FILTERING_SET, Some(3))
                .match_glyph(Some(&gdef), &50),
            Err(ParseError::MissingValue)
        );
    }

    #[test]
    fn chained_format2_classes() {
        let mut w = Writer::new();
        w.write(UInt16(2));
        let coverage_at = w.placeholder_u16();
        let backtrack_at = w.placeholder_u16();
        let input_at = w.placeholder_u16();
        w.write(UInt16(0)); // no lookahead classdef: everything is class 0
        w.write(UInt16(3));
        w.write(UInt16(0));
        w.write(UInt16(0));
        let class_set_at = w.placeholder_u16();
        w.patch_offset16(coverage_at, 0);
        coverage(&mut w, &[5, 6]);
        w.patch_offset16(backtrack_at, 0);
        w.u16s(&[2, 1, 1, 1, 7]); // glyph 1 is class 7
        w.patch_offset16(input_at, 0);
        w.u16s(&[2, 1, 5, 9, 2]); // glyphs 5..=9 are class 2
        w.patch_offset16(class_set_at, 0);
        let class_set = w.offset();
        w.write(UInt16(1));
        let rule_at = w.placeholder_u16();
        w.patch_offset16(rule_at, class_set);
        w.u16s(&[1, 7, 2, 2, 1, 0, 1, 0, 3]);

        let context = ReadScope::new(&w.data)
            .read::<ChainedSequenceContext<'_, GSUB>>()
            .unwrap();
        let found = context
            .apply_at(None, MatchType::ignore_marks(), &[1u16, 6, 9, 100], 1)
            .unwrap()
            .unwrap();
        assert_eq!(found.lookup_records.get_item(0).map(|r| r.lookup_list_index), Some(3));
        assert!(context
            .apply_at(None, MatchType::ignore_marks(), &[2u16, 6, 9, 100], 1)
            .unwrap()
            .is_none());
        // Glyphs outside the coverage never reach the class sets.
        assert!(context
            .find_match(7, |_| Ok(true))
            .unwrap()
            .is_none());
        assert!(context
            .find_match(5, |_| Ok(true))
            .unwrap()
            .is_some());
    }

    #[test]
    fn format3_coverages() {
        let mut w = Writer::new();
        w.u16s(&[3, 2, 1]); // format, glyph count, lookup count
        let first_at = w.placeholder_u16();
        let second_at = w.placeholder_u16();
        w.u16s(&[1, 8]);
        w.patch_offset16(first_at, 0);
        coverage(&mut w, &[40, 41]);
        w.patch_offset16(second_at, 0);
        coverage(&mut w, &[42]);

        let context = ReadScope::new(&w.data)
            .read::<SequenceContext<'_, GSUB>>()
            .unwrap();
        let found = context
            .apply_at(None, MatchType::ignore_marks(), &[41u16, 42], 0)
            .unwrap()
            .unwrap();
        assert_eq!(found.lookup_records.item(0).unwrap().lookup_list_index, 8);
        assert!(context
            .apply_at(None, MatchType::ignore_marks(), &[41u16, 43], 0)
            .unwrap()
            .is_none());
        assert!(context
            .apply_at(None, MatchType::ignore_marks(), &[42u16, 42], 0)
            .unwrap()
            .is_none());
    }
}
