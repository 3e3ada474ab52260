//! Common OpenType Layout tables shared by `GSUB` and `GPOS`.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2>
//!
//! Every structure here is a view over the caller's table data. Offsets are resolved against the
//! scope of the table that stores them, lazily, when the caller asks for the referenced table.

pub mod coverage;
pub mod feature_variations;

use std::fmt;
use std::marker::PhantomData;

use bitflags::bitflags;
use itertools::Itertools;
use log::{debug, warn};
use tinyvec::TinyVec;

use crate::binary::read::{
    ReadArray, ReadBinary, ReadBinaryDep, ReadCtxt, ReadFrom, ReadScope,
};
use crate::binary::{U16Be, U32Be};
use crate::error::ParseError;
use crate::tables::F2Dot14;
use crate::tag;

use feature_variations::{FeatureTableSubstitution, FeatureVariations};

/// Marker for the glyph substitution table.
#[derive(Copy, Clone, Debug)]
pub enum GSUB {}

/// Marker for the glyph positioning table.
#[derive(Copy, Clone, Debug)]
pub enum GPOS {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubstLookupType {
    SingleSubst,
    MultipleSubst,
    AlternateSubst,
    LigatureSubst,
    ContextSubst,
    ChainContextSubst,
    ReverseChainSingleSubst,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PosLookupType {
    SinglePos,
    PairPos,
    CursivePos,
    MarkBasePos,
    MarkLigPos,
    MarkMarkPos,
    ContextPos,
    ChainContextPos,
}

/// The declared type of a lookup: a concrete lookup type or an extension wrapper around one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupType<L> {
    Normal(L),
    Extension,
}

pub trait LayoutTableType: Copy + fmt::Debug + 'static {
    type BaseLookupType: Copy + PartialEq + fmt::Debug;

    const TABLE_TAG: u32;

    fn check_lookup_type(lookup_type: u16) -> Result<LookupType<Self::BaseLookupType>, ParseError>;
}

impl LayoutTableType for GSUB {
    type BaseLookupType = SubstLookupType;

    const TABLE_TAG: u32 = tag::GSUB;

    fn check_lookup_type(lookup_type: u16) -> Result<LookupType<SubstLookupType>, ParseError> {
        match lookup_type {
            1 => Ok(LookupType::Normal(SubstLookupType::SingleSubst)),
            2 => Ok(LookupType::Normal(SubstLookupType::MultipleSubst)),
            3 => Ok(LookupType::Normal(SubstLookupType::AlternateSubst)),
            4 => Ok(LookupType::Normal(SubstLookupType::LigatureSubst)),
            5 => Ok(LookupType::Normal(SubstLookupType::ContextSubst)),
            6 => Ok(LookupType::Normal(SubstLookupType::ChainContextSubst)),
            7 => Ok(LookupType::Extension),
            8 => Ok(LookupType::Normal(SubstLookupType::ReverseChainSingleSubst)),
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl LayoutTableType for GPOS {
    type BaseLookupType = PosLookupType;

    const TABLE_TAG: u32 = tag::GPOS;

    fn check_lookup_type(lookup_type: u16) -> Result<LookupType<PosLookupType>, ParseError> {
        match lookup_type {
            1 => Ok(LookupType::Normal(PosLookupType::SinglePos)),
            2 => Ok(LookupType::Normal(PosLookupType::PairPos)),
            3 => Ok(LookupType::Normal(PosLookupType::CursivePos)),
            4 => Ok(LookupType::Normal(PosLookupType::MarkBasePos)),
            5 => Ok(LookupType::Normal(PosLookupType::MarkLigPos)),
            6 => Ok(LookupType::Normal(PosLookupType::MarkMarkPos)),
            7 => Ok(LookupType::Normal(PosLookupType::ContextPos)),
            8 => Ok(LookupType::Normal(PosLookupType::ChainContextPos)),
            9 => Ok(LookupType::Extension),
            _ => Err(ParseError::BadVersion),
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct LookupFlag: u16 {
        const RIGHT_TO_LEFT = 0x0001;
        const IGNORE_BASE_GLYPHS = 0x0002;
        const IGNORE_LIGATURES = 0x0004;
        const IGNORE_MARKS = 0x0008;
        const USE_MARK_FILTERING_SET = 0x0010;
        const MARK_ATTACHMENT_TYPE = 0xFF00;
    }
}

impl LookupFlag {
    /// Mark attachment class filter, 0 when marks are not filtered by class.
    pub fn mark_attachment_type(self) -> u16 {
        (self & LookupFlag::MARK_ATTACHMENT_TYPE).bits() >> 8
    }
}

/// A `GSUB` or `GPOS` table header with its three lists.
#[derive(Clone, Debug)]
pub struct LayoutTable<'a, T: LayoutTableType> {
    pub major_version: u16,
    pub minor_version: u16,
    pub opt_script_list: Option<ScriptList<'a>>,
    pub opt_feature_list: Option<FeatureList<'a>>,
    pub opt_lookup_list: Option<LookupList<'a, T>>,
    pub opt_feature_variations: Option<FeatureVariations<'a>>,
}

/// Tag and offset pair used by the script, language system and feature records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TagOffsetRecord {
    pub tag: u32,
    pub offset: u16,
}

#[derive(Copy, Clone, Debug)]
pub struct ScriptList<'a> {
    scope: ReadScope<'a>,
    script_records: ReadArray<'a, TagOffsetRecord>,
}

#[derive(Copy, Clone, Debug)]
pub struct Script<'a> {
    scope: ReadScope<'a>,
    default_langsys_offset: u16,
    langsys_records: ReadArray<'a, TagOffsetRecord>,
}

#[derive(Copy, Clone, Debug)]
pub struct LangSys<'a> {
    required_feature_index: u16,
    feature_indices: ReadArray<'a, U16Be>,
}

#[derive(Copy, Clone, Debug)]
pub struct FeatureList<'a> {
    scope: ReadScope<'a>,
    feature_records: ReadArray<'a, TagOffsetRecord>,
}

#[derive(Copy, Clone, Debug)]
pub struct Feature<'a> {
    feature_params_offset: u16,
    lookup_indices: ReadArray<'a, U16Be>,
}

#[derive(Copy, Clone, Debug)]
pub struct LookupList<'a, T: LayoutTableType> {
    scope: ReadScope<'a>,
    lookup_offsets: ReadArray<'a, U16Be>,
    phantom: PhantomData<T>,
}

#[derive(Copy, Clone, Debug)]
pub struct Lookup<'a, T: LayoutTableType> {
    scope: ReadScope<'a>,
    lookup_type: LookupType<T::BaseLookupType>,
    lookup_flag: LookupFlag,
    subtable_offsets: ReadArray<'a, U16Be>,
    mark_filtering_set: Option<u16>,
}

/// Extension subtable (`GSUB` type 7, `GPOS` type 9) redirecting to a subtable through a 32-bit
/// offset.
#[derive(Copy, Clone, Debug)]
pub struct ExtensionSubtable<'a, T: LayoutTableType> {
    scope: ReadScope<'a>,
    pub extension_lookup_type: T::BaseLookupType,
    pub extension_offset: u32,
}

/// Iterator over the subtables of a lookup with any extension indirection removed.
#[derive(Clone, Debug)]
pub struct ResolvedSubtables<'a, T: LayoutTableType> {
    lookup: Lookup<'a, T>,
    lookup_type: T::BaseLookupType,
    index: usize,
}

/// Read an optional table at a 16 or 32-bit offset from `scope`. A zero offset means absent.
pub(crate) fn read_optional<'a, T: ReadBinaryDep<Args<'a> = ()>>(
    scope: &ReadScope<'a>,
    offset: usize,
) -> Result<Option<T::HostType<'a>>, ParseError> {
    if offset == 0 {
        Ok(None)
    } else if offset >= scope.len() {
        Err(ParseError::BadOffset)
    } else {
        scope.offset(offset).read::<T>().map(Some)
    }
}

/// Like `read_optional` but a null offset is `MissingValue`.
pub(crate) fn read_required<'a, T: ReadBinaryDep<Args<'a> = ()>>(
    scope: &ReadScope<'a>,
    offset: usize,
) -> Result<T::HostType<'a>, ParseError> {
    read_optional::<T>(scope, offset)?.ok_or(ParseError::MissingValue)
}

impl ReadFrom for TagOffsetRecord {
    type ReadType = (U32Be, U16Be);

    fn read_from((tag, offset): (u32, u16)) -> Self {
        TagOffsetRecord { tag, offset }
    }
}

impl<T: LayoutTableType> ReadBinary for LayoutTable<'_, T> {
    type HostType<'a> = LayoutTable<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<LayoutTable<'a, T>, ParseError> {
        let table = ctxt.scope();

        let major_version = ctxt.read_u16be()?;
        let minor_version = ctxt.read_u16be()?;
        // We handle versions 1.x
        ctxt.check_version(major_version == 1)?;
        let script_list_offset = usize::from(ctxt.read_u16be()?);
        let feature_list_offset = usize::from(ctxt.read_u16be()?);
        let lookup_list_offset = usize::from(ctxt.read_u16be()?);
        let feature_variations_offset = if minor_version >= 1 {
            usize::try_from(ctxt.read_u32be()?)?
        } else {
            0
        };

        let opt_script_list = read_optional::<ScriptList<'_>>(&table, script_list_offset)?;
        let opt_feature_list = read_optional::<FeatureList<'_>>(&table, feature_list_offset)?;
        let opt_lookup_list = read_optional::<LookupList<'_, T>>(&table, lookup_list_offset)?;
        let opt_feature_variations =
            read_optional::<FeatureVariations<'_>>(&table, feature_variations_offset)?;

        Ok(LayoutTable {
            major_version,
            minor_version,
            opt_script_list,
            opt_feature_list,
            opt_lookup_list,
            opt_feature_variations,
        })
    }
}

impl<'a, T: LayoutTableType> LayoutTable<'a, T> {
    pub fn find_script(&self, script_tag: u32) -> Result<Option<Script<'a>>, ParseError> {
        match &self.opt_script_list {
            Some(script_list) => script_list.find_script(script_tag),
            None => Ok(None),
        }
    }

    /// Find the script with `script_tag`, falling back to the `DFLT` script.
    pub fn find_script_or_default(
        &self,
        script_tag: u32,
    ) -> Result<Option<Script<'a>>, ParseError> {
        match self.find_script(script_tag)? {
            Some(script) => Ok(Some(script)),
            None => self.find_script(tag::DFLT),
        }
    }

    /// Resolve the language system used for `script_tag` and `opt_langsys_tag`, applying the
    /// script and language system fallbacks.
    pub fn find_langsys(
        &self,
        script_tag: u32,
        opt_langsys_tag: Option<u32>,
    ) -> Result<Option<LangSys<'a>>, ParseError> {
        match self.find_script_or_default(script_tag)? {
            Some(script) => script.find_langsys_or_default(opt_langsys_tag),
            None => Ok(None),
        }
    }

    pub fn lookup(&self, lookup_index: u16) -> Result<Lookup<'a, T>, ParseError> {
        match &self.opt_lookup_list {
            Some(lookup_list) => lookup_list.lookup(lookup_index),
            None => Err(ParseError::MissingValue),
        }
    }

    /// Enumerate the lookup indices enabled for a script and language system.
    ///
    /// `enabled_features` filters features by tag; when empty every feature is enabled. The
    /// required feature of the language system is always included.
    pub fn lookup_indices<'b>(
        &self,
        script_tag: u32,
        opt_langsys_tag: Option<u32>,
        enabled_features: &'b [u32],
    ) -> LookupIndices<'a, 'b> {
        let langsys = self.find_langsys(script_tag, opt_langsys_tag);
        self.make_lookup_indices(langsys, Ok(None), enabled_features)
    }

    /// Like `lookup_indices` but with feature tables replaced according to the first feature
    /// variation record matching the normalized coordinates `coords`.
    pub fn lookup_indices_with_variations<'b>(
        &self,
        script_tag: u32,
        opt_langsys_tag: Option<u32>,
        enabled_features: &'b [u32],
        coords: &[F2Dot14],
    ) -> LookupIndices<'a, 'b> {
        let langsys = self.find_langsys(script_tag, opt_langsys_tag);
        let substitution = match &self.opt_feature_variations {
            Some(feature_variations) => feature_variations.find_substitutions(coords),
            None => Ok(None),
        };
        self.make_lookup_indices(langsys, substitution, enabled_features)
    }

    fn make_lookup_indices<'b>(
        &self,
        langsys: Result<Option<LangSys<'a>>, ParseError>,
        substitution: Result<Option<FeatureTableSubstitution<'a>>, ParseError>,
        enabled_features: &'b [u32],
    ) -> LookupIndices<'a, 'b> {
        let (langsys, substitution) = match (langsys, substitution) {
            (Ok(langsys), Ok(substitution)) => (langsys, substitution),
            (Err(err), _) | (_, Err(err)) => return LookupIndices::failed(err, enabled_features),
        };
        match (langsys, self.opt_feature_list) {
            (Some(langsys), Some(feature_list)) => {
                LookupIndices::new(feature_list, langsys, substitution, enabled_features)
            }
            _ => LookupIndices::empty(enabled_features),
        }
    }
}

impl ReadBinary for ScriptList<'_> {
    type HostType<'a> = ScriptList<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ScriptList<'a>, ParseError> {
        let scope = ctxt.scope();
        let script_count = usize::from(ctxt.read_u16be()?);
        let script_records = ctxt.read_array::<TagOffsetRecord>(script_count)?;
        Ok(ScriptList {
            scope,
            script_records,
        })
    }
}

impl<'a> ScriptList<'a> {
    pub fn script_records(&self) -> &ReadArray<'a, TagOffsetRecord> {
        &self.script_records
    }

    pub fn find_script(&self, script_tag: u32) -> Result<Option<Script<'a>>, ParseError> {
        match self.script_records.iter().find(|record| record.tag == script_tag) {
            Some(record) => self.script(&record).map(Some),
            None => Ok(None),
        }
    }

    pub fn script(&self, record: &TagOffsetRecord) -> Result<Script<'a>, ParseError> {
        self.scope
            .offset_checked(usize::from(record.offset))?
            .read::<Script<'_>>()
    }
}

impl ReadBinary for Script<'_> {
    type HostType<'a> = Script<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Script<'a>, ParseError> {
        let scope = ctxt.scope();
        let default_langsys_offset = ctxt.read_u16be()?;
        let langsys_count = usize::from(ctxt.read_u16be()?);
        let langsys_records = ctxt.read_array::<TagOffsetRecord>(langsys_count)?;
        Ok(Script {
            scope,
            default_langsys_offset,
            langsys_records,
        })
    }
}

impl<'a> Script<'a> {
    pub fn langsys_records(&self) -> &ReadArray<'a, TagOffsetRecord> {
        &self.langsys_records
    }

    pub fn default_langsys(&self) -> Result<Option<LangSys<'a>>, ParseError> {
        read_optional::<LangSys<'_>>(&self.scope, usize::from(self.default_langsys_offset))
    }

    pub fn find_langsys(&self, langsys_tag: u32) -> Result<Option<LangSys<'a>>, ParseError> {
        match self
            .langsys_records
            .iter()
            .find(|record| record.tag == langsys_tag)
        {
            Some(record) => self
                .scope
                .offset_checked(usize::from(record.offset))?
                .read::<LangSys<'_>>()
                .map(Some),
            None => Ok(None),
        }
    }

    /// Find the language system with `opt_langsys_tag`, falling back to the default language
    /// system when there is no tag or no record for it.
    pub fn find_langsys_or_default(
        &self,
        opt_langsys_tag: Option<u32>,
    ) -> Result<Option<LangSys<'a>>, ParseError> {
        if let Some(langsys_tag) = opt_langsys_tag {
            if let Some(langsys) = self.find_langsys(langsys_tag)? {
                return Ok(Some(langsys));
            }
        }
        self.default_langsys()
    }
}

impl ReadBinary for LangSys<'_> {
    type HostType<'a> = LangSys<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<LangSys<'a>, ParseError> {
        let _lookup_order_offset = ctxt.read_u16be()?;
        let required_feature_index = ctxt.read_u16be()?;
        let feature_index_count = usize::from(ctxt.read_u16be()?);
        let feature_indices = ctxt.read_array::<U16Be>(feature_index_count)?;
        Ok(LangSys {
            required_feature_index,
            feature_indices,
        })
    }
}

impl<'a> LangSys<'a> {
    /// Index of the feature required by this language system, `None` when 0xFFFF.
    pub fn required_feature_index(&self) -> Option<u16> {
        match self.required_feature_index {
            0xFFFF => None,
            index => Some(index),
        }
    }

    pub fn feature_indices(&self) -> &ReadArray<'a, U16Be> {
        &self.feature_indices
    }
}

impl ReadBinary for FeatureList<'_> {
    type HostType<'a> = FeatureList<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<FeatureList<'a>, ParseError> {
        let scope = ctxt.scope();
        let feature_count = usize::from(ctxt.read_u16be()?);
        let feature_records = ctxt.read_array::<TagOffsetRecord>(feature_count)?;
        Ok(FeatureList {
            scope,
            feature_records,
        })
    }
}

impl<'a> FeatureList<'a> {
    pub fn len(&self) -> usize {
        self.feature_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_records.is_empty()
    }

    pub fn feature_records(&self) -> &ReadArray<'a, TagOffsetRecord> {
        &self.feature_records
    }

    pub fn feature_tag(&self, feature_index: u16) -> Result<u32, ParseError> {
        let record = self.feature_records.item(usize::from(feature_index))?;
        Ok(record.tag)
    }

    /// The feature table at `feature_index`, `None` when its offset is null.
    pub fn feature(&self, feature_index: u16) -> Result<Option<Feature<'a>>, ParseError> {
        let record = self.feature_records.item(usize::from(feature_index))?;
        read_optional::<Feature<'_>>(&self.scope, usize::from(record.offset))
    }
}

impl ReadBinary for Feature<'_> {
    type HostType<'a> = Feature<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Feature<'a>, ParseError> {
        let feature_params_offset = ctxt.read_u16be()?;
        let lookup_index_count = usize::from(ctxt.read_u16be()?);
        let lookup_indices = ctxt.read_array::<U16Be>(lookup_index_count)?;
        Ok(Feature {
            feature_params_offset,
            lookup_indices,
        })
    }
}

impl<'a> Feature<'a> {
    pub fn feature_params_offset(&self) -> u16 {
        self.feature_params_offset
    }

    pub fn lookup_indices(&self) -> &ReadArray<'a, U16Be> {
        &self.lookup_indices
    }
}

impl<T: LayoutTableType> ReadBinary for LookupList<'_, T> {
    type HostType<'a> = LookupList<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<LookupList<'a, T>, ParseError> {
        let scope = ctxt.scope();
        let lookup_count = usize::from(ctxt.read_u16be()?);
        let lookup_offsets = ctxt.read_array::<U16Be>(lookup_count)?;
        Ok(LookupList {
            scope,
            lookup_offsets,
            phantom: PhantomData,
        })
    }
}

impl<'a, T: LayoutTableType> LookupList<'a, T> {
    pub fn len(&self) -> usize {
        self.lookup_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup_offsets.is_empty()
    }

    pub fn lookup(&self, lookup_index: u16) -> Result<Lookup<'a, T>, ParseError> {
        let lookup_offset = self.lookup_offsets.item(usize::from(lookup_index))?;
        self.scope
            .offset_checked(usize::from(lookup_offset))?
            .read::<Lookup<'_, T>>()
    }
}

impl<T: LayoutTableType> ReadBinary for Lookup<'_, T> {
    type HostType<'a> = Lookup<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Lookup<'a, T>, ParseError> {
        let scope = ctxt.scope();
        let lookup_type = T::check_lookup_type(ctxt.read_u16be()?)?;
        let lookup_flag = LookupFlag::from_bits_retain(ctxt.read_u16be()?);
        let subtable_count = usize::from(ctxt.read_u16be()?);
        let subtable_offsets = ctxt.read_array::<U16Be>(subtable_count)?;
        let mark_filtering_set = if lookup_flag.contains(LookupFlag::USE_MARK_FILTERING_SET) {
            Some(ctxt.read_u16be()?)
        } else {
            None
        };
        Ok(Lookup {
            scope,
            lookup_type,
            lookup_flag,
            subtable_offsets,
            mark_filtering_set,
        })
    }
}

impl<'a, T: LayoutTableType> Lookup<'a, T> {
    /// The declared lookup type, which may be `Extension`. See `resolved_lookup_type`.
    pub fn lookup_type(&self) -> LookupType<T::BaseLookupType> {
        self.lookup_type
    }

    pub fn lookup_flag(&self) -> LookupFlag {
        self.lookup_flag
    }

    /// Index into the GDEF mark glyph sets, present when `USE_MARK_FILTERING_SET` is set.
    pub fn mark_filtering_set(&self) -> Option<u16> {
        self.mark_filtering_set
    }

    pub fn subtable_count(&self) -> usize {
        self.subtable_offsets.len()
    }

    /// The scope of subtable `index` without resolving extensions.
    pub fn subtable(&self, index: usize) -> Result<ReadScope<'a>, ParseError> {
        let offset = self.subtable_offsets.item(index)?;
        self.scope.offset_checked(usize::from(offset))
    }

    pub fn subtables(&self) -> impl Iterator<Item = Result<ReadScope<'a>, ParseError>> + '_ {
        (0..self.subtable_count()).map(move |index| self.subtable(index))
    }

    /// The subtables of this lookup with extension subtables replaced by their targets.
    ///
    /// All extension subtables of a lookup must share one lookup type; a mismatch yields
    /// `BadVersion` for that subtable.
    pub fn resolved_subtables(&self) -> Result<ResolvedSubtables<'a, T>, ParseError> {
        let lookup_type = match self.lookup_type {
            LookupType::Normal(lookup_type) => lookup_type,
            LookupType::Extension => {
                let first = self.subtable(0).map_err(|_| ParseError::MissingValue)?;
                first.read::<ExtensionSubtable<'_, T>>()?.extension_lookup_type
            }
        };
        Ok(ResolvedSubtables {
            lookup: *self,
            lookup_type,
            index: 0,
        })
    }

    /// The lookup type after resolving extensions.
    pub fn resolved_lookup_type(&self) -> Result<T::BaseLookupType, ParseError> {
        Ok(self.resolved_subtables()?.lookup_type())
    }

    /// Return the first result produced by `f` over the resolved subtables.
    ///
    /// Subtables for which `f` fails are skipped.
    pub fn find_subtable<S>(
        &self,
        f: impl Fn(ReadScope<'a>) -> Result<Option<S>, ParseError>,
    ) -> Result<Option<S>, ParseError> {
        for subtable in self.resolved_subtables()? {
            match f(subtable?) {
                Ok(Some(t)) => return Ok(Some(t)),
                Ok(None) => {}
                Err(err) => warn!("skipping invalid subtable: {}", err),
            }
        }
        Ok(None)
    }

    /// Read every resolved subtable as `S`, skipping subtables that fail to parse.
    pub fn read_subtables<S>(&self) -> Result<Vec<S::HostType<'a>>, ParseError>
    where
        S: ReadBinaryDep<Args<'a> = T::BaseLookupType>,
    {
        let resolved = self.resolved_subtables()?;
        let lookup_type = resolved.lookup_type();
        let mut subtables = Vec::with_capacity(self.subtable_count());
        for subtable in resolved {
            match subtable?.read_dep::<S>(lookup_type) {
                Ok(subtable) => subtables.push(subtable),
                Err(err) => warn!("skipping invalid subtable: {}", err),
            }
        }
        Ok(subtables)
    }
}

impl<T: LayoutTableType> ReadBinary for ExtensionSubtable<'_, T> {
    type HostType<'a> = ExtensionSubtable<'a, T>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ExtensionSubtable<'a, T>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let extension_lookup_type = match T::check_lookup_type(ctxt.read_u16be()?)? {
                    LookupType::Normal(lookup_type) => lookup_type,
                    LookupType::Extension => return Err(ParseError::BadVersion),
                };
                let extension_offset = ctxt.read_u32be()?;
                Ok(ExtensionSubtable {
                    scope,
                    extension_lookup_type,
                    extension_offset,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a, T: LayoutTableType> ExtensionSubtable<'a, T> {
    pub fn target(&self) -> Result<ReadScope<'a>, ParseError> {
        let offset = usize::try_from(self.extension_offset)?;
        self.scope.offset_checked(offset)
    }
}

impl<'a, T: LayoutTableType> ResolvedSubtables<'a, T> {
    pub fn lookup_type(&self) -> T::BaseLookupType {
        self.lookup_type
    }

    fn resolve(&self, subtable: ReadScope<'a>) -> Result<ReadScope<'a>, ParseError> {
        match self.lookup.lookup_type {
            LookupType::Normal(_) => Ok(subtable),
            LookupType::Extension => {
                let extension = subtable.read::<ExtensionSubtable<'_, T>>()?;
                if extension.extension_lookup_type != self.lookup_type {
                    return Err(ParseError::BadVersion);
                }
                extension.target()
            }
        }
    }
}

impl<'a, T: LayoutTableType> Iterator for ResolvedSubtables<'a, T> {
    type Item = Result<ReadScope<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.lookup.subtable_count() {
            let subtable = self.lookup.subtable(self.index);
            self.index += 1;
            Some(subtable.and_then(|subtable| self.resolve(subtable)))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.lookup.subtable_count().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

/// Lazy enumeration of the lookup indices enabled for a language system.
///
/// The required feature comes first, then the language system's features in order, each
/// contributing its lookup indices in stored order. A structural failure ends the sequence early
/// and clears `is_valid`. Cloning restarts from the clone point.
#[derive(Clone, Debug)]
pub struct LookupIndices<'a, 'b> {
    feature_list: Option<FeatureList<'a>>,
    substitution: Option<FeatureTableSubstitution<'a>>,
    enabled_features: &'b [u32],
    pending_required: Option<u16>,
    required_feature_index: Option<u16>,
    feature_indices: ReadArray<'a, U16Be>,
    next_feature: usize,
    current: ReadArray<'a, U16Be>,
    next_lookup: usize,
    error: Option<ParseError>,
}

impl<'a, 'b> LookupIndices<'a, 'b> {
    fn new(
        feature_list: FeatureList<'a>,
        langsys: LangSys<'a>,
        substitution: Option<FeatureTableSubstitution<'a>>,
        enabled_features: &'b [u32],
    ) -> Self {
        let required_feature_index = langsys.required_feature_index();
        LookupIndices {
            feature_list: Some(feature_list),
            substitution,
            enabled_features,
            pending_required: required_feature_index,
            required_feature_index,
            feature_indices: langsys.feature_indices,
            next_feature: 0,
            current: ReadArray::empty(),
            next_lookup: 0,
            error: None,
        }
    }

    fn empty(enabled_features: &'b [u32]) -> Self {
        LookupIndices {
            feature_list: None,
            substitution: None,
            enabled_features,
            pending_required: None,
            required_feature_index: None,
            feature_indices: ReadArray::empty(),
            next_feature: 0,
            current: ReadArray::empty(),
            next_lookup: 0,
            error: None,
        }
    }

    fn failed(err: ParseError, enabled_features: &'b [u32]) -> Self {
        debug!("lookup enumeration failed: {}", err);
        LookupIndices {
            error: Some(err),
            ..LookupIndices::empty(enabled_features)
        }
    }

    /// False when enumeration stopped because of malformed data rather than exhaustion.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The error that stopped enumeration, if any.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Collect the remaining indices in lookup list order with duplicates removed, which is the
    /// order lookups are applied in.
    pub fn into_sorted(mut self) -> Result<TinyVec<[u16; 32]>, ParseError> {
        let mut indices = self.by_ref().collect::<TinyVec<[u16; 32]>>();
        if let Some(err) = self.error {
            return Err(err);
        }
        indices.sort_unstable();
        Ok(indices.into_iter().dedup().collect())
    }

    /// The next feature to enumerate as `(feature_index, is_required)`.
    fn next_feature_index(&mut self) -> Option<(u16, bool)> {
        if let Some(required) = self.pending_required.take() {
            return Some((required, true));
        }
        while let Some(feature_index) = self.feature_indices.get_item(self.next_feature) {
            self.next_feature += 1;
            if Some(feature_index) != self.required_feature_index {
                return Some((feature_index, false));
            }
        }
        None
    }

    fn feature_lookups(
        &self,
        feature_index: u16,
        is_required: bool,
    ) -> Result<Option<ReadArray<'a, U16Be>>, ParseError> {
        let feature_list = match &self.feature_list {
            Some(feature_list) => feature_list,
            None => return Ok(None),
        };
        let feature_tag = feature_list.feature_tag(feature_index)?;
        if !is_required
            && !self.enabled_features.is_empty()
            && !self.enabled_features.contains(&feature_tag)
        {
            return Ok(None);
        }
        let alternate = match &self.substitution {
            Some(substitution) => substitution.alternate_feature(feature_index)?,
            None => None,
        };
        let feature = match alternate {
            Some(feature) => Some(feature),
            None => feature_list.feature(feature_index)?,
        };
        Ok(feature.map(|feature| feature.lookup_indices))
    }
}

impl Iterator for LookupIndices<'_, '_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        if self.error.is_some() {
            return None;
        }
        loop {
            if let Some(lookup_index) = self.current.get_item(self.next_lookup) {
                self.next_lookup += 1;
                return Some(lookup_index);
            }
            let (feature_index, is_required) = self.next_feature_index()?;
            match self.feature_lookups(feature_index, is_required) {
                Ok(Some(lookup_indices)) => {
                    self.current = lookup_indices;
                    self.next_lookup = 0;
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        "lookup enumeration aborted at feature {}: {}",
                        feature_index, err
                    );
                    self.error = Some(err);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::writer::{TtfType::*, Writer};

    struct FeatureDef {
        tag: u32,
        lookups: &'static [u16],
    }

    /// Build a GSUB table with one `latn` script whose default language system uses
    /// `feature_indices` and the optional required feature. A feature with no lookups is written
    /// with a null offset.
    fn build_gsub(required: u16, feature_indices: &[u16], features: &[FeatureDef]) -> Vec<u8> {
        let mut w = Writer::new();
        w.u16s(&[1, 0]);
        let script_list_at = w.placeholder_u16();
        let feature_list_at = w.placeholder_u16();
        let lookup_list_at = w.placeholder_u16();

        w.patch_offset16(script_list_at, 0);
        let script_list = w.offset();
        w.write(UInt16(1));
        w.write(UInt32(tag::LATN));
        let script_at = w.placeholder_u16();
        w.patch_offset16(script_at, script_list);
        let script = w.offset();
        let langsys_at = w.placeholder_u16();
        w.write(UInt16(0));
        w.patch_offset16(langsys_at, script);
        w.u16s(&[0, required, feature_indices.len() as u16]);
        w.u16s(feature_indices);

        w.patch_offset16(feature_list_at, 0);
        let feature_list = w.offset();
        w.write(UInt16(features.len() as u16));
        let mut feature_offsets = Vec::new();
        for feature in features {
            w.write(UInt32(feature.tag));
            feature_offsets.push(w.placeholder_u16());
        }
        for (feature, at) in features.iter().zip(feature_offsets) {
            if feature.lookups.is_empty() {
                continue;
            }
            w.patch_offset16(at, feature_list);
            w.u16s(&[0, feature.lookups.len() as u16]);
            w.u16s(feature.lookups);
        }

        w.patch_offset16(lookup_list_at, 0);
        w.write(UInt16(0));
        w.data
    }

    fn sample_features() -> Vec<FeatureDef> {
        vec![
            FeatureDef {
                tag: tag::CCMP,
                lookups: &[4, 1],
            },
            FeatureDef {
                tag: tag::LIGA,
                lookups: &[2],
            },
            FeatureDef {
                tag: tag::SMCP,
                lookups: &[],
            },
            FeatureDef {
                tag: tag::LOCL,
                lookups: &[0, 3],
            },
        ]
    }

    #[test]
    fn enumerates_required_feature_first() {
        let data = build_gsub(3, &[0, 1, 2, 3], &sample_features());
        let gsub = ReadScope::new(&data)
            .read::<LayoutTable<'_, GSUB>>()
            .unwrap();
        let mut indices = gsub.lookup_indices(tag::LATN, None, &[]);
        assert_eq!(indices.by_ref().collect::<Vec<_>>(), vec![0, 3, 4, 1, 2]);
        assert!(indices.is_valid());
    }

    #[test]
    fn filter_does_not_apply_to_required_feature() {
        let data = build_gsub(3, &[0, 1, 2, 3], &sample_features());
        let gsub = ReadScope::new(&data)
            .read::<LayoutTable<'_, GSUB>>()
            .unwrap();
        let indices = gsub.lookup_indices(tag::LATN, None, &[tag::LIGA]);
        assert_eq!(indices.collect::<Vec<_>>(), vec![0, 3, 2]);
    }

    #[test]
    fn falls_back_to_dflt_script_absence() {
        let data = build_gsub(0xFFFF, &[1], &sample_features());
        let gsub = ReadScope::new(&data)
            .read::<LayoutTable<'_, GSUB>>()
            .unwrap();
        // No DFLT script in this table so an unknown script yields nothing.
        let mut indices = gsub.lookup_indices(tag::from_bytes(*b"cyrl"), None, &[]);
        assert_eq!(indices.next(), None);
        assert!(indices.is_valid());
        // Unknown language falls back to the default language system.
        let indices = gsub.lookup_indices(tag::LATN, Some(tag::from_bytes(*b"TRK ")), &[]);
        assert_eq!(indices.collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn restartable_by_clone() {
        let data = build_gsub(0xFFFF, &[0, 3], &sample_features());
        let gsub = ReadScope::new(&data)
            .read::<LayoutTable<'_, GSUB>>()
            .unwrap();
        let mut indices = gsub.lookup_indices(tag::LATN, None, &[]);
        assert_eq!(indices.next(), Some(4));
        let restart = indices.clone();
        assert_eq!(indices.collect::<Vec<_>>(), vec![1, 0, 3]);
        assert_eq!(restart.collect::<Vec<_>>(), vec![1, 0, 3]);
        let sorted = gsub
            .lookup_indices(tag::LATN, None, &[])
            .into_sorted()
            .unwrap();
        assert_eq!(sorted.as_slice(), &[0, 1, 3, 4]);
    }

    #[test]
    fn bad_feature_index_invalidates() {
        let data = build_gsub(0xFFFF, &[1, 9, 0], &sample_features());
        let gsub = ReadScope::new(&data)
            .read::<LayoutTable<'_, GSUB>>()
            .unwrap();
        let mut indices = gsub.lookup_indices(tag::LATN, None, &[]);
        assert_eq!(indices.by_ref().collect::<Vec<_>>(), vec![2]);
        assert!(!indices.is_valid());
        assert_eq!(indices.error(), Some(&ParseError::BadIndex));
        assert_eq!(
            gsub.lookup_indices(tag::LATN, None, &[]).into_sorted(),
            Err(ParseError::BadIndex)
        );
    }

    #[test]
    fn lookup_with_mark_filtering_set() {
        let mut w = Writer::new();
        w.u16s(&[1]); // lookup count
        w.u16s(&[4]); // lookup offset
        w.u16s(&[6, 0x0018, 1, 10, 7]); // type, flag, count, subtable offset, mark filtering set
        let lookup_list = ReadScope::new(&w.data)
            .read::<LookupList<'_, GSUB>>()
            .unwrap();
        let lookup = lookup_list.lookup(0).unwrap();
        assert_eq!(
            lookup.lookup_type(),
            LookupType::Normal(SubstLookupType::ChainContextSubst)
        );
        assert!(lookup.lookup_flag().contains(LookupFlag::IGNORE_MARKS));
        assert_eq!(lookup.mark_filtering_set(), Some(7));
        assert_eq!(lookup_list.lookup(1).err(), Some(ParseError::BadIndex));
    }

    #[test]
    fn resolves_extension_subtables() {
        let mut w = Writer::new();
        w.u16s(&[7, 0x0200, 1, 8]); // type, flag, count, subtable offset
        w.write_all(&[UInt16(1), UInt16(4), UInt32(8)]); // extension to ligature subst
        w.u16s(&[1, 0xBEEF]);
        let lookup = ReadScope::new(&w.data)
            .read::<Lookup<'_, GSUB>>()
            .unwrap();
        assert_eq!(lookup.lookup_type(), LookupType::Extension);
        assert_eq!(lookup.lookup_flag().mark_attachment_type(), 2);
        assert_eq!(
            lookup.resolved_lookup_type(),
            Ok(SubstLookupType::LigatureSubst)
        );
        let subtables = lookup
            .resolved_subtables()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(subtables[0].data(), &[0, 1, 0xBE, 0xEF]);
    }

    #[test]
    fn nested_extension_is_rejected() {
        let mut w = Writer::new();
        w.u16s(&[9, 0, 1, 8]);
        w.write_all(&[UInt16(1), UInt16(9), UInt32(8)]);
        let lookup = ReadScope::new(&w.data)
            .read::<Lookup<'_, GPOS>>()
            .unwrap();
        assert_eq!(lookup.resolved_lookup_type(), Err(ParseError::BadVersion));
    }

    #[test]
    fn rejects_bad_header() {
        assert_eq!(
            ReadScope::new(&[0, 2, 0, 0, 0, 0, 0, 0, 0, 0])
                .read::<LayoutTable<'_, GPOS>>()
                .err(),
            Some(ParseError::BadVersion)
        );
        assert_eq!(
            ReadScope::new(&[0, 1, 0, 0, 0, 40, 0, 0, 0, 0])
                .read::<LayoutTable<'_, GPOS>>()
                .err(),
            Some(ParseError::BadOffset)
        );
    }
}
