//! `cmap` character to glyph index mapping table.
//!
//! <https://docs.microsoft.com/en-us/typography/opentype/spec/cmap>

pub mod fast_map;
pub mod reverse_map;

use std::cmp::Ordering;

use log::warn;

use crate::binary::read::{ReadArray, ReadBinary, ReadCtxt, ReadFrom, ReadScope, ReadUnchecked};
use crate::binary::{I16Be, U16Be, U24Be, U32Be, U8};
use crate::error::ParseError;
use crate::layout::read_optional;
use crate::size;

const SUB_HEADER_SIZE: usize = 4 * size::U16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PlatformId(pub u16);

impl PlatformId {
    pub const UNICODE: PlatformId = PlatformId(0);
    pub const MACINTOSH: PlatformId = PlatformId(1);
    pub const WINDOWS: PlatformId = PlatformId(3);
    pub const CUSTOM: PlatformId = PlatformId(4);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncodingId(pub u16);

impl EncodingId {
    pub const UNICODE_BMP: EncodingId = EncodingId(3);
    pub const UNICODE_FULL: EncodingId = EncodingId(4);
    pub const UNICODE_VARIATION_SEQUENCES: EncodingId = EncodingId(5);
    pub const UNICODE_FULL_REPERTOIRE: EncodingId = EncodingId(6);

    pub const WINDOWS_SYMBOL: EncodingId = EncodingId(0);
    pub const WINDOWS_UNICODE_BMP_UCS2: EncodingId = EncodingId(1);
    pub const WINDOWS_SHIFT_JIS: EncodingId = EncodingId(2);
    pub const WINDOWS_PRC: EncodingId = EncodingId(3);
    pub const WINDOWS_BIG5: EncodingId = EncodingId(4);
    pub const WINDOWS_WANSUNG: EncodingId = EncodingId(5);
    pub const WINDOWS_JOHAB: EncodingId = EncodingId(6);
    pub const WINDOWS_UNICODE_UCS4: EncodingId = EncodingId(10);

    pub const MACINTOSH_APPLE_ROMAN: EncodingId = EncodingId(0);
}

#[derive(Copy, Clone, Debug)]
pub struct Cmap<'a> {
    pub scope: ReadScope<'a>,
    pub encoding_records: ReadArray<'a, EncodingRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncodingRecord {
    pub platform_id: u16,
    pub encoding_id: u16,
    pub offset: u32,
}

/// A decoded cmap subtable.
///
/// `map` returns glyph 0 for code points the subtable does not cover. Errors are reserved for
/// subtables whose data is inconsistent with their own header.
#[derive(Copy, Clone, Debug)]
pub enum CmapSubtable<'a> {
    Format0 {
        language: u16,
        glyph_id_array: ReadArray<'a, U8>,
    },
    Format2 {
        language: u16,
        sub_header_keys: ReadArray<'a, U16Be>,
        sub_headers: ReadArray<'a, SubHeader>,
        sub_headers_scope: ReadScope<'a>,
    },
    Format4(Format4<'a>),
    Format6 {
        language: u16,
        first_code: u16,
        glyph_id_array: ReadArray<'a, U16Be>,
    },
    Format8 {
        language: u32,
        is32: ReadArray<'a, U8>,
        groups: ReadArray<'a, SequentialMapGroup>,
    },
    Format10 {
        language: u32,
        start_char_code: u32,
        glyph_id_array: ReadArray<'a, U16Be>,
    },
    Format12 {
        language: u32,
        groups: ReadArray<'a, SequentialMapGroup>,
    },
    Format13 {
        language: u32,
        groups: ReadArray<'a, ConstantMapGroup>,
    },
    Format14(Format14<'a>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubHeader {
    pub first_code: u16,
    pub entry_count: u16,
    pub id_delta: i16,
    pub id_range_offset: u16,
}

/// Segment mapping to delta values.
#[derive(Copy, Clone, Debug)]
pub struct Format4<'a> {
    pub language: u16,
    pub end_codes: ReadArray<'a, U16Be>,
    pub start_codes: ReadArray<'a, U16Be>,
    pub id_deltas: ReadArray<'a, I16Be>,
    pub id_range_offsets: ReadArray<'a, U16Be>,
    pub glyph_id_array: ReadArray<'a, U16Be>,
}

/// One segment of a format 4 subtable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start_code: u16,
    pub end_code: u16,
    pub id_delta: i16,
    pub id_range_offset: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SequentialMapGroup {
    pub start_char_code: u32,
    pub end_char_code: u32,
    pub start_glyph_id: u32,
}

/// Group of a format 13 subtable: every code point maps to `glyph_id`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConstantMapGroup {
    pub start_char_code: u32,
    pub end_char_code: u32,
    pub glyph_id: u32,
}

/// Unicode variation sequences.
#[derive(Copy, Clone, Debug)]
pub struct Format14<'a> {
    scope: ReadScope<'a>,
    var_selector_records: ReadArray<'a, VariationSelectorRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VariationSelectorRecord {
    pub var_selector: u32,
    pub default_uvs_offset: u32,
    pub non_default_uvs_offset: u32,
}

/// Ranges of base characters whose variation sequence uses the default glyph.
#[derive(Copy, Clone, Debug)]
pub struct DefaultUvs<'a> {
    ranges: ReadArray<'a, UnicodeRange>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnicodeRange {
    pub start_unicode_value: u32,
    pub additional_count: u8,
}

/// Base characters whose variation sequence maps to a specific glyph.
#[derive(Copy, Clone, Debug)]
pub struct NonDefaultUvs<'a> {
    mappings: ReadArray<'a, UvsMapping>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UvsMapping {
    pub unicode_value: u32,
    pub glyph_id: u16,
}

/// Result of looking up a variation sequence in a format 14 subtable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariantGlyph {
    /// The sequence is not listed for the selector.
    NotFound,
    /// The sequence uses the glyph the base character maps to.
    UseDefault,
    Found(u16),
}

/// The preferred Unicode subtable of a `cmap` together with its variation sequences, if any.
#[derive(Copy, Clone, Debug)]
pub struct UnicodeMap<'a> {
    pub encoding_record: EncodingRecord,
    pub subtable: CmapSubtable<'a>,
    pub opt_variations: Option<Format14<'a>>,
}

impl ReadBinary for Cmap<'_> {
    type HostType<'a> = Cmap<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Cmap<'a>, ParseError> {
        let scope = ctxt.scope();
        let version = ctxt.read_u16be()?;
        ctxt.check_version(version == 0)?;
        let num_tables = usize::from(ctxt.read_u16be()?);
        let encoding_records = ctxt.read_array::<EncodingRecord>(num_tables)?;

        Ok(Cmap {
            scope,
            encoding_records,
        })
    }
}

impl ReadFrom for EncodingRecord {
    type ReadType = (U16Be, U16Be, U32Be);

    fn read_from((platform_id, encoding_id, offset): (u16, u16, u32)) -> Self {
        EncodingRecord {
            platform_id,
            encoding_id,
            offset,
        }
    }
}

impl ReadBinary for CmapSubtable<'_> {
    type HostType<'a> = CmapSubtable<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<CmapSubtable<'a>, ParseError> {
        let subtable_scope = ctxt.scope();
        let format = ctxt.read_u16be()?;
        match format {
            0 => {
                let _length = ctxt.read_u16be()?;
                let language = ctxt.read_u16be()?;
                let glyph_id_array = ctxt.read_array::<U8>(256)?;
                Ok(CmapSubtable::Format0 {
                    language,
                    glyph_id_array,
                })
            }
            2 => {
                let _length = ctxt.read_u16be()?;
                let language = ctxt.read_u16be()?;
                let sub_header_keys = ctxt.read_array::<U16Be>(256)?;

                // Keys are sub-header index × 8.
                let max_sub_header_index = sub_header_keys
                    .iter()
                    .map(|key| key / 8)
                    .max()
                    .unwrap_or(0);
                let sub_headers_scope = ctxt.scope();
                let sub_headers =
                    ctxt.read_array::<SubHeader>(usize::from(max_sub_header_index) + 1)?;

                Ok(CmapSubtable::Format2 {
                    language,
                    sub_header_keys,
                    sub_headers,
                    sub_headers_scope,
                })
            }
            4 => {
                let length = usize::from(ctxt.read_u16be()?);
                ctxt.check(length >= 16)?;
                let language = ctxt.read_u16be()?;
                let seg_count_x2 = usize::from(ctxt.read_u16be()?);
                ctxt.check(seg_count_x2 & 1 == 0)?;
                let seg_count = seg_count_x2 >> 1;
                ctxt.check(seg_count > 0)?;
                let _search_range = ctxt.read_u16be()?;
                let _entry_selector = ctxt.read_u16be()?;
                let _range_shift = ctxt.read_u16be()?;
                let end_codes = ctxt.read_array::<U16Be>(seg_count)?;
                let _reserved_pad = ctxt.read_u16be()?;
                let start_codes = ctxt.read_array::<U16Be>(seg_count)?;
                let id_deltas = ctxt.read_array::<I16Be>(seg_count)?;
                let id_range_offsets = ctxt.read_array::<U16Be>(seg_count)?;

                let header_size = (8 + 4 * seg_count) * size::U16;
                ctxt.check(length >= header_size)?;
                let remaining = length - header_size;
                ctxt.check(remaining & 1 == 0)?;
                let glyph_id_array = ctxt.read_array::<U16Be>(remaining >> 1)?;

                Ok(CmapSubtable::Format4(Format4 {
                    language,
                    end_codes,
                    start_codes,
                    id_deltas,
                    id_range_offsets,
                    glyph_id_array,
                }))
            }
            6 => {
                let _length = ctxt.read_u16be()?;
                let language = ctxt.read_u16be()?;
                let first_code = ctxt.read_u16be()?;
                let entry_count = usize::from(ctxt.read_u16be()?);
                let glyph_id_array = ctxt.read_array::<U16Be>(entry_count)?;
                Ok(CmapSubtable::Format6 {
                    language,
                    first_code,
                    glyph_id_array,
                })
            }
            8 => {
                let _reserved = ctxt.read_u16be()?;
                let _length = ctxt.read_u32be()?;
                let language = ctxt.read_u32be()?;
                let is32 = ctxt.read_array::<U8>(8192)?;
                let num_groups = usize::try_from(ctxt.read_u32be()?)?;
                let groups = ctxt.read_array::<SequentialMapGroup>(num_groups)?;
                Ok(CmapSubtable::Format8 {
                    language,
                    is32,
                    groups,
                })
            }
            10 => {
                let _reserved = ctxt.read_u16be()?;
                let _length = ctxt.read_u32be()?;
                let language = ctxt.read_u32be()?;
                let start_char_code = ctxt.read_u32be()?;
                let num_chars = usize::try_from(ctxt.read_u32be()?)?;
                let glyph_id_array = ctxt.read_array::<U16Be>(num_chars)?;
                Ok(CmapSubtable::Format10 {
                    language,
                    start_char_code,
                    glyph_id_array,
                })
            }
            12 => {
                let _reserved = ctxt.read_u16be()?;
                let _length = ctxt.read_u32be()?;
                let language = ctxt.read_u32be()?;
                let num_groups = usize::try_from(ctxt.read_u32be()?)?;
                let groups = ctxt.read_array::<SequentialMapGroup>(num_groups)?;
                Ok(CmapSubtable::Format12 { language, groups })
            }
            13 => {
                let _reserved = ctxt.read_u16be()?;
                let _length = ctxt.read_u32be()?;
                let language = ctxt.read_u32be()?;
                let num_groups = usize::try_from(ctxt.read_u32be()?)?;
                let groups = ctxt.read_array::<ConstantMapGroup>(num_groups)?;
                Ok(CmapSubtable::Format13 { language, groups })
            }
            14 => {
                let length = usize::try_from(ctxt.read_u32be()?)?;
                ctxt.check(length >= 10)?;
                let scope = subtable_scope.offset_length(0, length)?;
                let mut records = scope.ctxt();
                records.skip(6)?;
                let num_records = usize::try_from(records.read_u32be()?)?;
                let var_selector_records =
                    records.read_array::<VariationSelectorRecord>(num_records)?;
                Ok(CmapSubtable::Format14(Format14 {
                    scope,
                    var_selector_records,
                }))
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl ReadFrom for SubHeader {
    type ReadType = ((U16Be, U16Be), (I16Be, U16Be));

    fn read_from(
        ((first_code, entry_count), (id_delta, id_range_offset)): ((u16, u16), (i16, u16)),
    ) -> Self {
        SubHeader {
            first_code,
            entry_count,
            id_delta,
            id_range_offset,
        }
    }
}

impl SubHeader {
    fn contains(&self, value: u16) -> bool {
        value >= self.first_code && value - self.first_code < self.entry_count
    }
}

impl ReadFrom for SequentialMapGroup {
    type ReadType = (U32Be, U32Be, U32Be);

    fn read_from((start_char_code, end_char_code, start_glyph_id): (u32, u32, u32)) -> Self {
        SequentialMapGroup {
            start_char_code,
            end_char_code,
            start_glyph_id,
        }
    }
}

impl ReadFrom for ConstantMapGroup {
    type ReadType = (U32Be, U32Be, U32Be);

    fn read_from((start_char_code, end_char_code, glyph_id): (u32, u32, u32)) -> Self {
        ConstantMapGroup {
            start_char_code,
            end_char_code,
            glyph_id,
        }
    }
}

impl ReadFrom for VariationSelectorRecord {
    type ReadType = (U24Be, U32Be, U32Be);

    fn read_from(
        (var_selector, default_uvs_offset, non_default_uvs_offset): (u32, u32, u32),
    ) -> Self {
        VariationSelectorRecord {
            var_selector,
            default_uvs_offset,
            non_default_uvs_offset,
        }
    }
}

impl ReadFrom for UnicodeRange {
    type ReadType = (U24Be, U8);

    fn read_from((start_unicode_value, additional_count): (u32, u8)) -> Self {
        UnicodeRange {
            start_unicode_value,
            additional_count,
        }
    }
}

impl ReadFrom for UvsMapping {
    type ReadType = (U24Be, U16Be);

    fn read_from((unicode_value, glyph_id): (u32, u16)) -> Self {
        UvsMapping {
            unicode_value,
            glyph_id,
        }
    }
}

impl ReadBinary for DefaultUvs<'_> {
    type HostType<'a> = DefaultUvs<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<DefaultUvs<'a>, ParseError> {
        let num_ranges = usize::try_from(ctxt.read_u32be()?)?;
        let ranges = ctxt.read_array::<UnicodeRange>(num_ranges)?;
        Ok(DefaultUvs { ranges })
    }
}

impl ReadBinary for NonDefaultUvs<'_> {
    type HostType<'a> = NonDefaultUvs<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<NonDefaultUvs<'a>, ParseError> {
        let num_mappings = usize::try_from(ctxt.read_u32be()?)?;
        let mappings = ctxt.read_array::<UvsMapping>(num_mappings)?;
        Ok(NonDefaultUvs { mappings })
    }
}

trait CharCodeRange {
    fn char_codes(&self) -> (u32, u32);
}

impl CharCodeRange for SequentialMapGroup {
    fn char_codes(&self) -> (u32, u32) {
        (self.start_char_code, self.end_char_code)
    }
}

impl CharCodeRange for ConstantMapGroup {
    fn char_codes(&self) -> (u32, u32) {
        (self.start_char_code, self.end_char_code)
    }
}

fn find_group<T>(groups: &ReadArray<'_, T>, ch: u32) -> Option<T>
where
    T: ReadUnchecked<HostType = T> + CharCodeRange,
{
    let index = groups
        .binary_search_by(|group| {
            let (start, end) = group.char_codes();
            if end < ch {
                Ordering::Less
            } else if start > ch {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
        .ok()?;
    groups.get_item(index)
}

impl<'a> Cmap<'a> {
    /// Find the first encoding record for the given `platform_id`
    pub fn find_subtable_for_platform(&self, platform_id: PlatformId) -> Option<EncodingRecord> {
        self.encoding_records
            .iter()
            .find(|record| record.platform_id == platform_id.0)
    }

    /// Find the first encoding record for the given `platform_id` and `encoding_id`
    pub fn find_subtable(
        &self,
        platform_id: PlatformId,
        encoding_id: EncodingId,
    ) -> Option<EncodingRecord> {
        self.encoding_records.iter().find(|record| {
            record.platform_id == platform_id.0 && record.encoding_id == encoding_id.0
        })
    }

    pub fn subtable(&self, record: &EncodingRecord) -> Result<CmapSubtable<'a>, ParseError> {
        let offset = usize::try_from(record.offset)?;
        self.scope
            .offset_checked(offset)?
            .read::<CmapSubtable<'_>>()
    }

    /// Every encoding record paired with the result of reading its subtable.
    pub fn subtables(
        &self,
    ) -> impl Iterator<Item = (EncodingRecord, Result<CmapSubtable<'a>, ParseError>)> + '_ {
        self.encoding_records
            .iter()
            .map(move |record| (record, self.subtable(&record)))
    }

    /// The best Unicode subtable of this `cmap`.
    ///
    /// Platform 0 is preferred over platform 3, full repertoire encodings over BMP only ones and
    /// formats that can address all of Unicode over the rest. Subtables that fail to parse are
    /// skipped.
    pub fn find_unicode_subtable(&self) -> Option<(EncodingRecord, CmapSubtable<'a>)> {
        let mut best: Option<(u32, EncodingRecord, CmapSubtable<'a>)> = None;
        for record in self.encoding_records.iter() {
            if !is_unicode_encoding(&record) {
                continue;
            }
            let subtable = match self.subtable(&record) {
                Ok(subtable) => subtable,
                Err(err) => {
                    warn!(
                        "skipping cmap subtable {}/{}: {}",
                        record.platform_id, record.encoding_id, err
                    );
                    continue;
                }
            };
            let score = match unicode_score(&record, subtable.format()) {
                Some(score) => score,
                None => continue,
            };
            if best
                .as_ref()
                .map_or(true, |(best_score, _, _)| score > *best_score)
            {
                best = Some((score, record, subtable));
            }
        }
        best.map(|(_, record, subtable)| (record, subtable))
    }

    /// The variation sequences subtable: the Unicode 5 encoding if present, otherwise the first
    /// format 14 subtable.
    pub fn find_variation_subtable(&self) -> Option<Format14<'a>> {
        let preferred = self.find_subtable(
            PlatformId::UNICODE,
            EncodingId::UNICODE_VARIATION_SEQUENCES,
        );
        if let Some(record) = preferred {
            if let Ok(CmapSubtable::Format14(format14)) = self.subtable(&record) {
                return Some(format14);
            }
        }
        self.subtables().find_map(|(_, subtable)| match subtable {
            Ok(CmapSubtable::Format14(format14)) => Some(format14),
            _ => None,
        })
    }

    pub fn unicode_map(&self) -> Option<UnicodeMap<'a>> {
        let (encoding_record, subtable) = self.find_unicode_subtable()?;
        Some(UnicodeMap {
            encoding_record,
            subtable,
            opt_variations: self.find_variation_subtable(),
        })
    }
}

fn is_unicode_encoding(record: &EncodingRecord) -> bool {
    match PlatformId(record.platform_id) {
        PlatformId::UNICODE => {
            EncodingId(record.encoding_id) != EncodingId::UNICODE_VARIATION_SEQUENCES
        }
        PlatformId::WINDOWS => matches!(
            EncodingId(record.encoding_id),
            EncodingId::WINDOWS_UNICODE_BMP_UCS2 | EncodingId::WINDOWS_UNICODE_UCS4
        ),
        _ => false,
    }
}

fn unicode_score(record: &EncodingRecord, format: u16) -> Option<u32> {
    let format_score = match format {
        12 => 300,
        13 => 290,
        10 => 280,
        4 => 200,
        8 => 190,
        6 => 160,
        2 => 150,
        0 => 100,
        _ => return None,
    };
    let platform_score = if record.platform_id == PlatformId::UNICODE.0 {
        1000
    } else {
        900
    };
    let full_repertoire = matches!(
        (record.platform_id, record.encoding_id),
        (0, 4) | (0, 6) | (3, 10)
    );
    let encoding_score = if full_repertoire { 20 } else { 0 };
    Some(platform_score + encoding_score + format_score)
}

impl<'a> CmapSubtable<'a> {
    pub fn format(&self) -> u16 {
        match self {
            CmapSubtable::Format0 { .. } => 0,
            CmapSubtable::Format2 { .. } => 2,
            CmapSubtable::Format4(_) => 4,
            CmapSubtable::Format6 { .. } => 6,
            CmapSubtable::Format8 { .. } => 8,
            CmapSubtable::Format10 { .. } => 10,
            CmapSubtable::Format12 { .. } => 12,
            CmapSubtable::Format13 { .. } => 13,
            CmapSubtable::Format14(_) => 14,
        }
    }

    /// The Macintosh language of the subtable. Format 14 has none and reports 0.
    pub fn language(&self) -> u32 {
        match *self {
            CmapSubtable::Format0 { language, .. }
            | CmapSubtable::Format2 { language, .. }
            | CmapSubtable::Format6 { language, .. } => u32::from(language),
            CmapSubtable::Format4(ref format4) => u32::from(format4.language),
            CmapSubtable::Format8 { language, .. }
            | CmapSubtable::Format10 { language, .. }
            | CmapSubtable::Format12 { language, .. }
            | CmapSubtable::Format13 { language, .. } => language,
            CmapSubtable::Format14(_) => 0,
        }
    }

    /// Map `ch` to a glyph index, 0 when the code point is not mapped.
    pub fn map(&self, ch: u32) -> Result<u16, ParseError> {
        match *self {
            CmapSubtable::Format0 {
                ref glyph_id_array, ..
            } => {
                let glyph_id = usize::try_from(ch)
                    .ok()
                    .and_then(|index| glyph_id_array.get_item(index));
                Ok(glyph_id.map_or(0, u16::from))
            }
            CmapSubtable::Format2 {
                ref sub_header_keys,
                ref sub_headers,
                ref sub_headers_scope,
                ..
            } => {
                let ch = match u16::try_from(ch) {
                    Ok(ch) => ch,
                    Err(_) => return Ok(0),
                };
                map_format2(sub_header_keys, sub_headers, sub_headers_scope, ch)
            }
            CmapSubtable::Format4(ref format4) => match u16::try_from(ch) {
                Ok(ch) => format4.map(ch),
                Err(_) => Ok(0),
            },
            CmapSubtable::Format6 {
                first_code,
                ref glyph_id_array,
                ..
            } => {
                let glyph_id = u16::try_from(ch)
                    .ok()
                    .and_then(|ch| ch.checked_sub(first_code))
                    .and_then(|index| glyph_id_array.get_item(usize::from(index)));
                Ok(glyph_id.unwrap_or(0))
            }
            CmapSubtable::Format8 { ref groups, .. }
            | CmapSubtable::Format12 { ref groups, .. } => match find_group(groups, ch) {
                Some(group) => {
                    let glyph_id = group
                        .start_glyph_id
                        .checked_add(ch - group.start_char_code)
                        .ok_or(ParseError::BadValue)?;
                    Ok(u16::try_from(glyph_id)?)
                }
                None => Ok(0),
            },
            CmapSubtable::Format10 {
                start_char_code,
                ref glyph_id_array,
                ..
            } => {
                let glyph_id = ch
                    .checked_sub(start_char_code)
                    .and_then(|index| usize::try_from(index).ok())
                    .and_then(|index| glyph_id_array.get_item(index));
                Ok(glyph_id.unwrap_or(0))
            }
            CmapSubtable::Format13 { ref groups, .. } => match find_group(groups, ch) {
                Some(group) => Ok(u16::try_from(group.glyph_id)?),
                None => Ok(0),
            },
            CmapSubtable::Format14(_) => Ok(0),
        }
    }
}

// The low byte of `ch` is the first byte of the character and selects the sub-header. For
// two-byte characters the high byte is the second byte.
fn map_format2(
    sub_header_keys: &ReadArray<'_, U16Be>,
    sub_headers: &ReadArray<'_, SubHeader>,
    sub_headers_scope: &ReadScope<'_>,
    ch: u16,
) -> Result<u16, ParseError> {
    let [high_byte, low_byte] = ch.to_be_bytes();
    let sub_header_index = usize::from(sub_header_keys.item(usize::from(low_byte))? / 8);
    let sub_header = sub_headers.item(sub_header_index)?;

    let code = if sub_header_index == 0 {
        low_byte
    } else {
        high_byte
    };
    let code = u16::from(code);
    if !sub_header.contains(code) {
        return Ok(0);
    }

    // idRangeOffset counts bytes from its own position in the sub-header.
    let glyph_offset = sub_header_index * SUB_HEADER_SIZE
        + SUB_HEADER_SIZE
        - size::U16
        + usize::from(sub_header.id_range_offset)
        + usize::from(code - sub_header.first_code) * size::U16;
    let glyph_id = sub_headers_scope.offset(glyph_offset).ctxt().read_u16be()?;

    if sub_header_index != 0 && glyph_id != 0 {
        Ok(glyph_id.wrapping_add_signed(sub_header.id_delta))
    } else {
        Ok(glyph_id)
    }
}

impl<'a> Format4<'a> {
    pub fn seg_count(&self) -> usize {
        self.end_codes.len()
    }

    pub fn segment(&self, index: usize) -> Result<Segment, ParseError> {
        Ok(Segment {
            start_code: self.start_codes.item(index)?,
            end_code: self.end_codes.item(index)?,
            id_delta: self.id_deltas.item(index)?,
            id_range_offset: self.id_range_offsets.item(index)?,
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = Result<Segment, ParseError>> + 'a {
        let format4 = *self;
        (0..self.seg_count()).map(move |index| format4.segment(index))
    }

    /// Index into `glyph_id_array` of the glyph for the first code of segment `index`.
    ///
    /// `None` when the segment maps through `id_delta` alone.
    pub fn glyph_array_base(
        &self,
        index: usize,
        segment: &Segment,
    ) -> Result<Option<usize>, ParseError> {
        if segment.id_range_offset == 0 {
            return Ok(None);
        }
        if segment.id_range_offset & 1 != 0 {
            return Err(ParseError::BadValue);
        }
        // The offset is relative to the idRangeOffset entry itself, which is followed by the
        // remaining entries and then the glyph array.
        (usize::from(segment.id_range_offset / 2) + index)
            .checked_sub(self.seg_count())
            .map(Some)
            .ok_or(ParseError::BadIndex)
    }

    /// The glyph for `ch`, which must lie within segment `index`.
    pub fn segment_glyph(
        &self,
        index: usize,
        segment: &Segment,
        ch: u16,
    ) -> Result<u16, ParseError> {
        match self.glyph_array_base(index, segment)? {
            None => Ok(ch.wrapping_add_signed(segment.id_delta)),
            Some(base) => {
                let glyph_id = self
                    .glyph_id_array
                    .item(base + usize::from(ch - segment.start_code))?;
                if glyph_id == 0 {
                    Ok(0)
                } else {
                    Ok(glyph_id.wrapping_add_signed(segment.id_delta))
                }
            }
        }
    }

    pub fn map(&self, ch: u16) -> Result<u16, ParseError> {
        // First segment whose end code is not below `ch`.
        let index = match self.end_codes.binary_search_by(|end_code| {
            if end_code < ch {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }) {
            Ok(index) | Err(index) => index,
        };
        if index >= self.seg_count() {
            return Ok(0);
        }
        let segment = self.segment(index)?;
        if ch < segment.start_code {
            return Ok(0);
        }
        self.segment_glyph(index, &segment, ch)
    }
}

impl<'a> Format14<'a> {
    pub fn records(&self) -> impl Iterator<Item = VariationSelectorRecord> + 'a {
        self.var_selector_records.iter()
    }

    pub fn selectors(&self) -> impl Iterator<Item = u32> + 'a {
        self.records().map(|record| record.var_selector)
    }

    pub fn find_record(&self, var_selector: u32) -> Option<VariationSelectorRecord> {
        let index = self
            .var_selector_records
            .binary_search_by(|record| record.var_selector.cmp(&var_selector))
            .ok()?;
        self.var_selector_records.get_item(index)
    }

    pub fn default_uvs(
        &self,
        record: &VariationSelectorRecord,
    ) -> Result<Option<DefaultUvs<'a>>, ParseError> {
        let offset = usize::try_from(record.default_uvs_offset)?;
        read_optional::<DefaultUvs<'_>>(&self.scope, offset)
    }

    pub fn non_default_uvs(
        &self,
        record: &VariationSelectorRecord,
    ) -> Result<Option<NonDefaultUvs<'a>>, ParseError> {
        let offset = usize::try_from(record.non_default_uvs_offset)?;
        read_optional::<NonDefaultUvs<'_>>(&self.scope, offset)
    }

    /// Whether the sequence `ch`, `var_selector` is rendered with the default glyph for `ch`.
    pub fn is_default(&self, ch: u32, var_selector: u32) -> Result<bool, ParseError> {
        match self.find_record(var_selector) {
            Some(record) => Ok(self
                .default_uvs(&record)?
                .is_some_and(|default_uvs| default_uvs.contains(ch))),
            None => Ok(false),
        }
    }

    pub fn non_default_glyph(&self, ch: u32, var_selector: u32) -> Result<Option<u16>, ParseError> {
        match self.find_record(var_selector) {
            Some(record) => Ok(self
                .non_default_uvs(&record)?
                .and_then(|non_default_uvs| non_default_uvs.glyph(ch))),
            None => Ok(None),
        }
    }

    pub fn map_variant(&self, ch: u32, var_selector: u32) -> Result<VariantGlyph, ParseError> {
        let record = match self.find_record(var_selector) {
            Some(record) => record,
            None => return Ok(VariantGlyph::NotFound),
        };
        if let Some(glyph_id) = self
            .non_default_uvs(&record)?
            .and_then(|non_default_uvs| non_default_uvs.glyph(ch))
        {
            return Ok(VariantGlyph::Found(glyph_id));
        }
        if self
            .default_uvs(&record)?
            .is_some_and(|default_uvs| default_uvs.contains(ch))
        {
            return Ok(VariantGlyph::UseDefault);
        }
        Ok(VariantGlyph::NotFound)
    }
}

impl<'a> DefaultUvs<'a> {
    pub fn ranges(&self) -> impl Iterator<Item = UnicodeRange> + 'a {
        self.ranges.iter()
    }

    pub fn contains(&self, ch: u32) -> bool {
        self.ranges
            .binary_search_by(|range| {
                let end = range.start_unicode_value + u32::from(range.additional_count);
                if end < ch {
                    Ordering::Less
                } else if range.start_unicode_value > ch {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
            .is_ok()
    }
}

impl<'a> NonDefaultUvs<'a> {
    pub fn mappings(&self) -> impl Iterator<Item = UvsMapping> + 'a {
        self.mappings.iter()
    }

    pub fn glyph(&self, ch: u32) -> Option<u16> {
        let index = self
            .mappings
            .binary_search_by(|mapping| mapping.unicode_value.cmp(&ch))
            .ok()?;
        self.mappings.get_item(index).map(|mapping| mapping.glyph_id)
    }
}

impl<'a> UnicodeMap<'a> {
    pub fn map(&self, ch: u32) -> Result<u16, ParseError> {
        self.subtable.map(ch)
    }

    /// Map a variation sequence, falling back to the mapping of `ch` alone unless the sequence
    /// has a glyph of its own. A `var_selector` of 0 maps `ch` alone.
    pub fn map_variation_sequence(&self, ch: u32, var_selector: u32) -> Result<u16, ParseError> {
        if var_selector != 0 {
            if let Some(variations) = &self.opt_variations {
                if let Some(glyph_id) = variations.non_default_glyph(ch, var_selector)? {
                    return Ok(glyph_id);
                }
            }
        }
        self.map(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::writer::{TtfType::*, Writer};

    fn read_subtable(data: &[u8]) -> Result<CmapSubtable<'_>, ParseError> {
        ReadScope::new(data).read::<CmapSubtable<'_>>()
    }

    /// Lead byte 0x81 starts two-byte characters, everything else is a single byte.
    pub(super) fn format2_data() -> Vec<u8> {
        let mut w = Writer::new();
        w.u16s(&[2, 0, 3]);
        for lead_byte in 0..256 {
            w.u16s(&[if lead_byte == 0x81 { 8 } else { 0 }]);
        }
        // sub-header 0 glyphs at 534, sub-header 1 glyphs at 538
        w.u16s(&[0x41, 2, 0, 10]);
        w.write_all(&[UInt16(0x40), UInt16(2), Int16(10), UInt16(6)]);
        w.u16s(&[3, 4, 1, 0]);
        w.data
    }

    pub(super) fn format4_data() -> Vec<u8> {
        let mut w = Writer::new();
        w.u16s(&[4, 44, 0, 6, 4, 1, 2]);
        // end codes, pad, start codes
        w.u16s(&[0x43, 0x62, 0xFFFF, 0, 0x41, 0x61, 0xFFFF]);
        w.write_all(&[Int16(-0x40), Int16(5), Int16(1)]);
        w.u16s(&[0, 4, 0]);
        w.u16s(&[7, 0]);
        w.data
    }

    pub(super) fn format12_data(groups: &[(u32, u32, u32)], format: u16) -> Vec<u8> {
        let mut w = Writer::new();
        let length = 16 + 12 * groups.len() as u32;
        w.write_all(&[
            UInt16(format),
            UInt16(0),
            UInt32(length),
            UInt32(0),
            UInt32(groups.len() as u32),
        ]);
        for &(start, end, glyph) in groups {
            w.write_all(&[UInt32(start), UInt32(end), UInt32(glyph)]);
        }
        w.data
    }

    pub(super) fn format14_data() -> Vec<u8> {
        let mut w = Writer::new();
        w.write_all(&[UInt16(14), UInt32(49), UInt32(2)]);
        w.write_all(&[UInt24(0xFE00), UInt32(32), UInt32(0)]);
        w.write_all(&[UInt24(0xFE0F), UInt32(0), UInt32(40)]);
        w.write_all(&[UInt32(1), UInt24(0x2764), UInt8(1)]);
        w.write_all(&[UInt32(1), UInt24(0x2764), UInt16(42)]);
        w.data
    }

    #[test]
    fn format0() {
        let mut data = vec![0, 0, 1, 6, 0, 0];
        data.extend((0..=255u8).map(|byte| if byte == 0x41 { 5 } else { 0 }));
        let subtable = read_subtable(&data).unwrap();
        assert_eq!(subtable.format(), 0);
        assert_eq!(subtable.map(0x41), Ok(5));
        assert_eq!(subtable.map(0x42), Ok(0));
        assert_eq!(subtable.map(0x100), Ok(0));
        assert_eq!(
            read_subtable(&data[..261]).err(),
            Some(ParseError::BadEof)
        );
    }

    #[test]
    fn format2_single_and_double_byte() {
        let data = format2_data();
        let subtable = read_subtable(&data).unwrap();

        assert_eq!(subtable.language(), 3);
        assert_eq!(subtable.map(0x41), Ok(3));
        assert_eq!(subtable.map(0x42), Ok(4));
        assert_eq!(subtable.map(0x43), Ok(0));
        assert_eq!(subtable.map(0x4081), Ok(11));
        assert_eq!(subtable.map(0x4181), Ok(0));
        assert_eq!(subtable.map(0x4281), Ok(0));
        assert_eq!(subtable.map(0x1_0041), Ok(0));
    }

    #[test]
    fn format2_too_short() {
        let mut data = vec![0, 2, 0, 0, 0, 0];
        data.resize(6 + 512 + 7, 0);
        assert_eq!(read_subtable(&data).err(), Some(ParseError::BadEof));
        data.push(0);
        assert!(read_subtable(&data).is_ok());
    }

    #[test]
    fn format4() {
        let data = format4_data();
        let subtable = read_subtable(&data).unwrap();
        assert_eq!(subtable.map(0x40), Ok(0));
        assert_eq!(subtable.map(0x41), Ok(1));
        assert_eq!(subtable.map(0x43), Ok(3));
        assert_eq!(subtable.map(0x44), Ok(0));
        assert_eq!(subtable.map(0x61), Ok(12));
        assert_eq!(subtable.map(0x62), Ok(0));
        assert_eq!(subtable.map(0xFFFF), Ok(0));
        assert_eq!(subtable.map(0x1_0041), Ok(0));
    }

    #[test]
    fn format4_segments_outlive_subtable() {
        fn segments(data: &[u8]) -> impl Iterator<Item = Result<Segment, ParseError>> + '_ {
            match read_subtable(data).unwrap() {
                CmapSubtable::Format4(format4) => format4.segments(),
                _ => panic!("expected format 4"),
            }
        }

        let data = format4_data();
        let segments = segments(&data).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(
            segments,
            vec![
                Segment {
                    start_code: 0x41,
                    end_code: 0x43,
                    id_delta: -0x40,
                    id_range_offset: 0,
                },
                Segment {
                    start_code: 0x61,
                    end_code: 0x62,
                    id_delta: 5,
                    id_range_offset: 4,
                },
                Segment {
                    start_code: 0xFFFF,
                    end_code: 0xFFFF,
                    id_delta: 1,
                    id_range_offset: 0,
                },
            ]
        );
    }

    #[test]
    fn format4_header_checks() {
        let mut data = format4_data();
        data[7] = 5;
        assert_eq!(read_subtable(&data).err(), Some(ParseError::BadValue));
        data[7] = 0;
        assert_eq!(read_subtable(&data).err(), Some(ParseError::BadValue));

        let mut data = format4_data();
        data[3] = 14;
        assert_eq!(read_subtable(&data).err(), Some(ParseError::BadValue));
    }

    #[test]
    fn format4_odd_range_offset() {
        let mut data = format4_data();
        // idRangeOffset of the second segment
        data[37] = 3;
        let subtable = read_subtable(&data).unwrap();
        assert_eq!(subtable.map(0x41), Ok(1));
        assert_eq!(subtable.map(0x61), Err(ParseError::BadValue));
    }

    #[test]
    fn format6() {
        let data = [0, 6, 0, 16, 0, 0, 0, 0x30, 0, 3, 0, 10, 0, 11, 0, 12];
        let subtable = read_subtable(&data).unwrap();
        assert_eq!(subtable.map(0x2F), Ok(0));
        assert_eq!(subtable.map(0x30), Ok(10));
        assert_eq!(subtable.map(0x32), Ok(12));
        assert_eq!(subtable.map(0x33), Ok(0));
    }

    #[test]
    fn format8() {
        let mut w = Writer::new();
        w.write_all(&[UInt16(8), UInt16(0), UInt32(8220), UInt32(0)]);
        w.zeros(8192);
        w.write_all(&[UInt32(1), UInt32(0x1_0000), UInt32(0x1_0002), UInt32(20)]);
        let subtable = read_subtable(&w.data).unwrap();
        assert_eq!(subtable.map(0x1_0001), Ok(21));
        assert_eq!(subtable.map(0x1_0003), Ok(0));
        assert_eq!(
            read_subtable(&w.data[..8207]).err(),
            Some(ParseError::BadEof)
        );
    }

    #[test]
    fn format10() {
        let mut w = Writer::new();
        w.write_all(&[
            UInt16(10),
            UInt16(0),
            UInt32(24),
            UInt32(0),
            UInt32(0x1F600),
            UInt32(2),
        ]);
        w.u16s(&[5, 6]);
        let subtable = read_subtable(&w.data).unwrap();
        assert_eq!(subtable.map(0x1F5FF), Ok(0));
        assert_eq!(subtable.map(0x1F601), Ok(6));
        assert_eq!(subtable.map(0x1F602), Ok(0));
    }

    #[test]
    fn format12() {
        let data = format12_data(
            &[(0x20, 0x22, 1), (0x30, 0x40, 0xFFFF), (0x1F600, 0x1F601, 100)],
            12,
        );
        let subtable = read_subtable(&data).unwrap();
        assert_eq!(subtable.map(0x21), Ok(2));
        assert_eq!(subtable.map(0x23), Ok(0));
        assert_eq!(subtable.map(0x1F601), Ok(101));
        assert_eq!(subtable.map(0x30), Ok(0xFFFF));
        assert_eq!(subtable.map(0x31), Err(ParseError::BadValue));
    }

    #[test]
    fn format13() {
        let data = format12_data(&[(0x4E00, 0x9FFF, 7)], 13);
        let subtable = read_subtable(&data).unwrap();
        assert_eq!(subtable.format(), 13);
        assert_eq!(subtable.map(0x4DFF), Ok(0));
        assert_eq!(subtable.map(0x5000), Ok(7));
        assert_eq!(subtable.map(0x9FFF), Ok(7));
    }

    #[test]
    fn format14() {
        let data = format14_data();
        let format14 = match read_subtable(&data).unwrap() {
            CmapSubtable::Format14(format14) => format14,
            _ => panic!("expected format 14"),
        };
        assert_eq!(format14.selectors().collect::<Vec<_>>(), vec![0xFE00, 0xFE0F]);
        assert_eq!(format14.map_variant(0x2764, 0xFE0F), Ok(VariantGlyph::Found(42)));
        assert_eq!(format14.map_variant(0x2765, 0xFE00), Ok(VariantGlyph::UseDefault));
        assert_eq!(format14.map_variant(0x2766, 0xFE00), Ok(VariantGlyph::NotFound));
        assert_eq!(format14.map_variant(0x2764, 0xFE01), Ok(VariantGlyph::NotFound));
        assert_eq!(format14.is_default(0x2764, 0xFE00), Ok(true));
        assert_eq!(format14.is_default(0x2764, 0xFE0F), Ok(false));
        assert_eq!(format14.non_default_glyph(0x2764, 0xFE0F), Ok(Some(42)));
        assert_eq!(format14.non_default_glyph(0x2765, 0xFE0F), Ok(None));
        assert_eq!(CmapSubtable::Format14(format14).map(0x2764), Ok(0));
    }

    #[test]
    fn format14_offset_outside_subtable() {
        let mut data = format14_data();
        // non-default offset of the second record
        data[10 + 11 + 10] = 49;
        let format14 = match read_subtable(&data).unwrap() {
            CmapSubtable::Format14(format14) => format14,
            _ => panic!("expected format 14"),
        };
        assert_eq!(
            format14.map_variant(0x2764, 0xFE0F),
            Err(ParseError::BadOffset)
        );
    }

    #[test]
    fn unknown_format() {
        assert_eq!(
            read_subtable(&[0, 3, 0, 0]).err(),
            Some(ParseError::BadVersion)
        );
    }

    #[test]
    fn unicode_scoring() {
        let record = |platform_id, encoding_id| EncodingRecord {
            platform_id,
            encoding_id,
            offset: 0,
        };
        assert!(is_unicode_encoding(&record(0, 3)));
        assert!(!is_unicode_encoding(&record(0, 5)));
        assert!(is_unicode_encoding(&record(3, 10)));
        assert!(!is_unicode_encoding(&record(3, 0)));
        assert!(!is_unicode_encoding(&record(1, 0)));
        assert_eq!(unicode_score(&record(3, 10), 12), Some(1220));
        assert_eq!(unicode_score(&record(0, 3), 4), Some(1200));
        assert_eq!(unicode_score(&record(0, 5), 14), None);
    }
}
