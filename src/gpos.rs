//! Glyph positioning (`GPOS`) subtables.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/gpos>
//!
//! Value records, device tables and anchors are views over the subtable data. Device table
//! offsets inside a value record are relative to the positioning subtable that holds the record,
//! so each `ValueRecord` carries that subtable's scope.

use std::cmp::Ordering;

use bitflags::bitflags;
use log::warn;

use crate::binary::read::{
    ReadArray, ReadBinary, ReadBinaryDep, ReadCtxt, ReadFixedSizeDep, ReadFrom, ReadScope,
};
use crate::binary::U16Be;
use crate::context::{read_classdef, read_coverage, ChainedSequenceContext, SequenceContext};
use crate::error::ParseError;
use crate::layout::coverage::{ClassDef, Coverage};
use crate::layout::{read_optional, PosLookupType, GPOS};
use crate::size;

bitflags! {
    /// The fields present in a value record.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ValueFormat: u16 {
        const X_PLACEMENT = 0x0001;
        const Y_PLACEMENT = 0x0002;
        const X_ADVANCE = 0x0004;
        const Y_ADVANCE = 0x0008;
        const X_PLACEMENT_DEVICE = 0x0010;
        const Y_PLACEMENT_DEVICE = 0x0020;
        const X_ADVANCE_DEVICE = 0x0040;
        const Y_ADVANCE_DEVICE = 0x0080;
    }
}

impl ReadFrom for ValueFormat {
    type ReadType = U16Be;

    fn read_from(value_format: u16) -> Self {
        ValueFormat::from_bits_truncate(value_format)
    }
}

impl ValueFormat {
    /// Size in bytes of a value record with this format.
    pub fn size(self) -> usize {
        self.bits().count_ones() as usize * size::U16
    }

    /// Byte offset of `field` within a value record, `None` when the field is absent.
    ///
    /// `field` must be a single flag.
    pub fn field_offset(self, field: ValueFormat) -> Option<usize> {
        if field.is_empty() || !self.contains(field) {
            return None;
        }
        let below = self.bits() & (field.bits() - 1);
        Some(below.count_ones() as usize * size::U16)
    }
}

/// A positioning value record.
#[derive(Copy, Clone, Debug)]
pub struct ValueRecord<'a> {
    value_format: ValueFormat,
    data: ReadScope<'a>,
    subtable: ReadScope<'a>,
}

/// The non-device fields of a value record, absent fields being 0.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Adjust {
    pub x_placement: i16,
    pub y_placement: i16,
    pub x_advance: i16,
    pub y_advance: i16,
}

#[derive(Copy, Clone, Debug)]
pub enum Device<'a> {
    /// Per-size pixel adjustments packed as signed 2, 4 or 8 bit values.
    Hinting {
        start_size: u16,
        end_size: u16,
        delta_format: u16,
        deltas: ReadArray<'a, U16Be>,
    },
    /// Indices into an item variation store.
    VariationIndex { outer: u16, inner: u16 },
}

#[derive(Copy, Clone, Debug)]
pub enum Anchor<'a> {
    Format1 {
        x: i16,
        y: i16,
    },
    Format2 {
        x: i16,
        y: i16,
        anchor_point: u16,
    },
    Format3 {
        x: i16,
        y: i16,
        x_device: Option<Device<'a>>,
        y_device: Option<Device<'a>>,
    },
}

/// A grid of anchor offsets, one row per base, ligature component or mark and one column per
/// mark class. The column count is stored elsewhere so it is supplied when reading.
#[derive(Copy, Clone, Debug)]
pub struct AnchorMatrix<'a> {
    scope: ReadScope<'a>,
    rows: usize,
    cols: usize,
    anchor_offsets: ReadArray<'a, U16Be>,
}

#[derive(Copy, Clone, Debug)]
pub struct MarkArray<'a> {
    scope: ReadScope<'a>,
    mark_records: ReadArray<'a, MarkRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MarkRecord {
    pub class: u16,
    pub anchor_offset: u16,
}

#[derive(Copy, Clone, Debug)]
pub enum SinglePos<'a> {
    Format1 {
        coverage: Coverage<'a>,
        value_record: ValueRecord<'a>,
    },
    Format2 {
        coverage: Coverage<'a>,
        value_records: ReadArray<'a, ValueRecord<'a>>,
    },
}

#[derive(Copy, Clone, Debug)]
pub enum PairPos<'a> {
    Format1 {
        scope: ReadScope<'a>,
        coverage: Coverage<'a>,
        value_format1: ValueFormat,
        value_format2: ValueFormat,
        pair_set_offsets: ReadArray<'a, U16Be>,
    },
    Format2 {
        coverage: Coverage<'a>,
        classdef1: ClassDef<'a>,
        classdef2: ClassDef<'a>,
        class1_count: usize,
        class2_count: usize,
        /// `class1_count` rows of `class2_count` records.
        class2_records: ReadArray<'a, Class2Record<'a>>,
    },
}

#[derive(Copy, Clone, Debug)]
pub struct PairSet<'a> {
    pair_value_records: ReadArray<'a, PairValueRecord<'a>>,
}

#[derive(Copy, Clone, Debug)]
pub struct PairValueRecord<'a> {
    pub second_glyph: u16,
    pub value_record1: ValueRecord<'a>,
    pub value_record2: ValueRecord<'a>,
}

#[derive(Copy, Clone, Debug)]
pub struct Class2Record<'a> {
    pub value_record1: ValueRecord<'a>,
    pub value_record2: ValueRecord<'a>,
}

#[derive(Copy, Clone, Debug)]
pub struct CursivePos<'a> {
    scope: ReadScope<'a>,
    coverage: Coverage<'a>,
    entry_exit_records: ReadArray<'a, EntryExitRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntryExitRecord {
    pub entry_anchor_offset: u16,
    pub exit_anchor_offset: u16,
}

// also used for MarkToMark tables
#[derive(Copy, Clone, Debug)]
pub struct MarkBasePos<'a> {
    mark_coverage: Coverage<'a>,
    base_coverage: Coverage<'a>,
    mark_class_count: usize,
    mark_array: MarkArray<'a>,
    base_array: AnchorMatrix<'a>,
}

/// Mark to mark attachment has the layout of mark to base, with the preceding mark as the base.
pub type MarkMarkPos<'a> = MarkBasePos<'a>;

#[derive(Copy, Clone, Debug)]
pub struct MarkLigPos<'a> {
    mark_coverage: Coverage<'a>,
    ligature_coverage: Coverage<'a>,
    mark_class_count: usize,
    mark_array: MarkArray<'a>,
    ligature_array: LigatureArray<'a>,
}

/// One `AnchorMatrix` per ligature, with a row per component.
#[derive(Copy, Clone, Debug)]
pub struct LigatureArray<'a> {
    scope: ReadScope<'a>,
    mark_class_count: usize,
    ligature_attach_offsets: ReadArray<'a, U16Be>,
}

/// A `GPOS` lookup subtable, after extension resolution.
#[derive(Copy, Clone, Debug)]
pub enum PosLookupSubtable<'a> {
    SinglePos(SinglePos<'a>),
    PairPos(PairPos<'a>),
    CursivePos(CursivePos<'a>),
    MarkBasePos(MarkBasePos<'a>),
    MarkLigPos(MarkLigPos<'a>),
    MarkMarkPos(MarkMarkPos<'a>),
    ContextPos(SequenceContext<'a, GPOS>),
    ChainContextPos(ChainedSequenceContext<'a, GPOS>),
}

impl ReadBinaryDep for ValueRecord<'_> {
    type Args<'a> = (ValueFormat, ReadScope<'a>);
    type HostType<'a> = ValueRecord<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (value_format, subtable): (ValueFormat, ReadScope<'a>),
    ) -> Result<ValueRecord<'a>, ParseError> {
        let data = ctxt.read_scope(value_format.size())?;
        Ok(ValueRecord {
            value_format,
            data,
            subtable,
        })
    }
}

impl ReadFixedSizeDep for ValueRecord<'_> {
    fn size((value_format, _subtable): Self::Args<'_>) -> usize {
        value_format.size()
    }
}

impl<'a> ValueRecord<'a> {
    pub fn value_format(&self) -> ValueFormat {
        self.value_format
    }

    fn field(&self, field: ValueFormat) -> Option<u16> {
        let offset = self.value_format.field_offset(field)?;
        self.data.offset(offset).ctxt().read_u16be().ok()
    }

    pub fn x_placement(&self) -> Option<i16> {
        self.field(ValueFormat::X_PLACEMENT).map(|value| value as i16)
    }

    pub fn y_placement(&self) -> Option<i16> {
        self.field(ValueFormat::Y_PLACEMENT).map(|value| value as i16)
    }

    pub fn x_advance(&self) -> Option<i16> {
        self.field(ValueFormat::X_ADVANCE).map(|value| value as i16)
    }

    pub fn y_advance(&self) -> Option<i16> {
        self.field(ValueFormat::Y_ADVANCE).map(|value| value as i16)
    }

    /// Resolve a device offset against the enclosing subtable. An offset of 0, or one that does
    /// not land inside the subtable, means there is no device table.
    fn device(&self, field: ValueFormat) -> Result<Option<Device<'a>>, ParseError> {
        match self.field(field).map(usize::from) {
            None | Some(0) => Ok(None),
            Some(offset) if offset < self.subtable.len() => {
                self.subtable.offset(offset).read::<Device<'_>>().map(Some)
            }
            Some(offset) => {
                warn!(
                    "ignoring device offset {} past the end of a {} byte subtable",
                    offset,
                    self.subtable.len()
                );
                Ok(None)
            }
        }
    }

    pub fn x_placement_device(&self) -> Result<Option<Device<'a>>, ParseError> {
        self.device(ValueFormat::X_PLACEMENT_DEVICE)
    }

    pub fn y_placement_device(&self) -> Result<Option<Device<'a>>, ParseError> {
        self.device(ValueFormat::Y_PLACEMENT_DEVICE)
    }

    pub fn x_advance_device(&self) -> Result<Option<Device<'a>>, ParseError> {
        self.device(ValueFormat::X_ADVANCE_DEVICE)
    }

    pub fn y_advance_device(&self) -> Result<Option<Device<'a>>, ParseError> {
        self.device(ValueFormat::Y_ADVANCE_DEVICE)
    }

    pub fn adjust(&self) -> Adjust {
        Adjust {
            x_placement: self.x_placement().unwrap_or(0),
            y_placement: self.y_placement().unwrap_or(0),
            x_advance: self.x_advance().unwrap_or(0),
            y_advance: self.y_advance().unwrap_or(0),
        }
    }
}

impl ReadBinary for Device<'_> {
    type HostType<'a> = Device<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Device<'a>, ParseError> {
        let start_size = ctxt.read_u16be()?;
        let end_size = ctxt.read_u16be()?;
        let delta_format = ctxt.read_u16be()?;
        match delta_format {
            1..=3 => {
                ctxt.check(start_size <= end_size)?;
                let bits_per_delta = 1usize << delta_format;
                let count = usize::from(end_size - start_size) + 1;
                let word_count = (count * bits_per_delta).div_ceil(16);
                let deltas = ctxt.read_array::<U16Be>(word_count)?;
                Ok(Device::Hinting {
                    start_size,
                    end_size,
                    delta_format,
                    deltas,
                })
            }
            0x8000 => Ok(Device::VariationIndex {
                outer: start_size,
                inner: end_size,
            }),
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl Device<'_> {
    /// The adjustment in pixels at `ppem`, `None` outside the size range or for variation
    /// indices.
    pub fn delta(&self, ppem: u16) -> Option<i16> {
        match *self {
            Device::Hinting {
                start_size,
                end_size,
                delta_format,
                ref deltas,
            } => {
                if ppem < start_size || ppem > end_size {
                    return None;
                }
                let bits = 1usize << delta_format;
                let per_word = 16 / bits;
                let index = usize::from(ppem - start_size);
                let word = deltas.get_item(index / per_word)?;
                let shift = 16 - bits * (index % per_word + 1);
                let raw = i32::from(word >> shift) & ((1 << bits) - 1);
                let value = if raw >= 1 << (bits - 1) {
                    raw - (1 << bits)
                } else {
                    raw
                };
                Some(value as i16)
            }
            Device::VariationIndex { .. } => None,
        }
    }
}

impl ReadBinary for Anchor<'_> {
    type HostType<'a> = Anchor<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Anchor<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let x = ctxt.read_i16be()?;
                let y = ctxt.read_i16be()?;
                Ok(Anchor::Format1 { x, y })
            }
            2 => {
                let x = ctxt.read_i16be()?;
                let y = ctxt.read_i16be()?;
                let anchor_point = ctxt.read_u16be()?;
                Ok(Anchor::Format2 { x, y, anchor_point })
            }
            3 => {
                let x = ctxt.read_i16be()?;
                let y = ctxt.read_i16be()?;
                let x_device_offset = usize::from(ctxt.read_u16be()?);
                let y_device_offset = usize::from(ctxt.read_u16be()?);
                let x_device = read_optional::<Device<'_>>(&scope, x_device_offset)?;
                let y_device = read_optional::<Device<'_>>(&scope, y_device_offset)?;
                Ok(Anchor::Format3 {
                    x,
                    y,
                    x_device,
                    y_device,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl Anchor<'_> {
    pub fn x(&self) -> i16 {
        match *self {
            Anchor::Format1 { x, .. } | Anchor::Format2 { x, .. } | Anchor::Format3 { x, .. } => x,
        }
    }

    pub fn y(&self) -> i16 {
        match *self {
            Anchor::Format1 { y, .. } | Anchor::Format2 { y, .. } | Anchor::Format3 { y, .. } => y,
        }
    }
}

impl ReadBinaryDep for AnchorMatrix<'_> {
    type Args<'a> = usize;
    type HostType<'a> = AnchorMatrix<'a>;

    fn read_dep<'a>(ctxt: &mut ReadCtxt<'a>, cols: usize) -> Result<AnchorMatrix<'a>, ParseError> {
        ctxt.check(cols > 0)?;
        let scope = ctxt.scope();
        let rows = usize::from(ctxt.read_u16be()?);
        let count = rows.checked_mul(cols).ok_or(ParseError::LimitExceeded)?;
        let anchor_offsets = ctxt.read_array::<U16Be>(count)?;
        Ok(AnchorMatrix {
            scope,
            rows,
            cols,
            anchor_offsets,
        })
    }
}

impl<'a> AnchorMatrix<'a> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn anchor_offset(&self, row: usize, col: usize) -> Result<u16, ParseError> {
        if row >= self.rows || col >= self.cols {
            return Err(ParseError::BadIndex);
        }
        self.anchor_offsets.item(row * self.cols + col)
    }

    /// The anchor at (`row`, `col`), `None` when its offset is null.
    pub fn anchor(&self, row: usize, col: usize) -> Result<Option<Anchor<'a>>, ParseError> {
        let offset = self.anchor_offset(row, col)?;
        read_optional::<Anchor<'_>>(&self.scope, usize::from(offset))
    }
}

impl ReadFrom for MarkRecord {
    type ReadType = (U16Be, U16Be);

    fn read_from((class, anchor_offset): (u16, u16)) -> Self {
        MarkRecord {
            class,
            anchor_offset,
        }
    }
}

impl ReadBinary for MarkArray<'_> {
    type HostType<'a> = MarkArray<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<MarkArray<'a>, ParseError> {
        let scope = ctxt.scope();
        let mark_count = usize::from(ctxt.read_u16be()?);
        let mark_records = ctxt.read_array::<MarkRecord>(mark_count)?;
        Ok(MarkArray {
            scope,
            mark_records,
        })
    }
}

impl<'a> MarkArray<'a> {
    pub fn len(&self) -> usize {
        self.mark_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mark_records.is_empty()
    }

    pub fn mark_record(&self, index: usize) -> Result<MarkRecord, ParseError> {
        self.mark_records.item(index)
    }

    pub fn mark_class(&self, index: usize) -> Result<u16, ParseError> {
        Ok(self.mark_record(index)?.class)
    }

    pub fn anchor(&self, index: usize) -> Result<Option<Anchor<'a>>, ParseError> {
        let record = self.mark_record(index)?;
        read_optional::<Anchor<'_>>(&self.scope, usize::from(record.anchor_offset))
    }
}

impl ReadBinary for SinglePos<'_> {
    type HostType<'a> = SinglePos<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<SinglePos<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let value_format = ctxt.read::<ValueFormat>()?;
                let value_record = ctxt.read_dep::<ValueRecord<'a>>((value_format, scope))?;
                Ok(SinglePos::Format1 {
                    coverage,
                    value_record,
                })
            }
            2 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let value_format = ctxt.read::<ValueFormat>()?;
                let value_count = usize::from(ctxt.read_u16be()?);
                let value_records =
                    ctxt.read_array_dep::<ValueRecord<'a>>(value_count, (value_format, scope))?;
                Ok(SinglePos::Format2 {
                    coverage,
                    value_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> SinglePos<'a> {
    pub fn apply(&self, glyph: u16) -> Result<Option<ValueRecord<'a>>, ParseError> {
        match self {
            SinglePos::Format1 {
                coverage,
                value_record,
            } => Ok(coverage.contains(glyph).then_some(*value_record)),
            SinglePos::Format2 {
                coverage,
                value_records,
            } => match coverage.glyph_coverage_value(glyph) {
                Some(coverage_index) => value_records
                    .read_item(usize::from(coverage_index))
                    .map(Some),
                None => Ok(None),
            },
        }
    }
}

impl ReadBinary for PairPos<'_> {
    type HostType<'a> = PairPos<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<PairPos<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let value_format1 = ctxt.read::<ValueFormat>()?;
                let value_format2 = ctxt.read::<ValueFormat>()?;
                let pair_set_count = usize::from(ctxt.read_u16be()?);
                let pair_set_offsets = ctxt.read_array::<U16Be>(pair_set_count)?;
                Ok(PairPos::Format1 {
                    scope,
                    coverage,
                    value_format1,
                    value_format2,
                    pair_set_offsets,
                })
            }
            2 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let value_format1 = ctxt.read::<ValueFormat>()?;
                let value_format2 = ctxt.read::<ValueFormat>()?;
                let classdef1 = read_classdef(&scope, ctxt.read_u16be()?)?;
                let classdef2 = read_classdef(&scope, ctxt.read_u16be()?)?;
                let class1_count = usize::from(ctxt.read_u16be()?);
                let class2_count = usize::from(ctxt.read_u16be()?);
                let record_count = class1_count
                    .checked_mul(class2_count)
                    .ok_or(ParseError::LimitExceeded)?;
                let class2_records = ctxt.read_array_dep::<Class2Record<'a>>(
                    record_count,
                    (value_format1, value_format2, scope),
                )?;
                Ok(PairPos::Format2 {
                    coverage,
                    classdef1,
                    classdef2,
                    class1_count,
                    class2_count,
                    class2_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> PairPos<'a> {
    /// The pair set for the first glyph at `coverage_index` (format 1 only).
    pub fn pair_set(&self, coverage_index: usize) -> Result<PairSet<'a>, ParseError> {
        match self {
            PairPos::Format1 {
                scope,
                value_format1,
                value_format2,
                pair_set_offsets,
                ..
            } => {
                let offset = usize::from(pair_set_offsets.item(coverage_index)?);
                scope
                    .offset_checked(offset)?
                    .read_dep::<PairSet<'_>>((*value_format1, *value_format2, *scope))
            }
            PairPos::Format2 { .. } => Err(ParseError::MissingValue),
        }
    }

    /// The value records for `glyph1` followed by `glyph2`.
    pub fn apply(
        &self,
        glyph1: u16,
        glyph2: u16,
    ) -> Result<Option<(ValueRecord<'a>, ValueRecord<'a>)>, ParseError> {
        match self {
            PairPos::Format1 { coverage, .. } => match coverage.glyph_coverage_value(glyph1) {
                Some(coverage_index) => self.pair_set(usize::from(coverage_index))?.find(glyph2),
                None => Ok(None),
            },
            PairPos::Format2 {
                coverage,
                classdef1,
                classdef2,
                class1_count,
                class2_count,
                class2_records,
            } => {
                if !coverage.contains(glyph1) {
                    return Ok(None);
                }
                let class1_value = usize::from(classdef1.glyph_class_value(glyph1));
                let class2_value = usize::from(classdef2.glyph_class_value(glyph2));
                if class1_value >= *class1_count || class2_value >= *class2_count {
                    return Err(ParseError::BadIndex);
                }
                let record = class2_records.read_item(class1_value * class2_count + class2_value)?;
                Ok(Some((record.value_record1, record.value_record2)))
            }
        }
    }
}

impl ReadBinaryDep for PairSet<'_> {
    type Args<'a> = (ValueFormat, ValueFormat, ReadScope<'a>);
    type HostType<'a> = PairSet<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        args: (ValueFormat, ValueFormat, ReadScope<'a>),
    ) -> Result<PairSet<'a>, ParseError> {
        let pair_value_count = usize::from(ctxt.read_u16be()?);
        let pair_value_records = ctxt.read_array_dep::<PairValueRecord<'a>>(pair_value_count, args)?;
        Ok(PairSet { pair_value_records })
    }
}

impl<'a> PairSet<'a> {
    pub fn len(&self) -> usize {
        self.pair_value_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pair_value_records.is_empty()
    }

    pub fn find(
        &self,
        second_glyph: u16,
    ) -> Result<Option<(ValueRecord<'a>, ValueRecord<'a>)>, ParseError> {
        // Records are sorted by second glyph.
        let (mut low, mut high) = (0, self.pair_value_records.len());
        while low < high {
            let mid = low + (high - low) / 2;
            let record = self.pair_value_records.read_item(mid)?;
            match record.second_glyph.cmp(&second_glyph) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => {
                    return Ok(Some((record.value_record1, record.value_record2)));
                }
            }
        }
        Ok(None)
    }
}

impl ReadBinaryDep for PairValueRecord<'_> {
    type Args<'a> = (ValueFormat, ValueFormat, ReadScope<'a>);
    type HostType<'a> = PairValueRecord<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (value_format1, value_format2, subtable): (ValueFormat, ValueFormat, ReadScope<'a>),
    ) -> Result<PairValueRecord<'a>, ParseError> {
        let second_glyph = ctxt.read_u16be()?;
        let value_record1 = ctxt.read_dep::<ValueRecord<'a>>((value_format1, subtable))?;
        let value_record2 = ctxt.read_dep::<ValueRecord<'a>>((value_format2, subtable))?;
        Ok(PairValueRecord {
            second_glyph,
            value_record1,
            value_record2,
        })
    }
}

impl ReadFixedSizeDep for PairValueRecord<'_> {
    fn size((value_format1, value_format2, _): Self::Args<'_>) -> usize {
        size::U16 + value_format1.size() + value_format2.size()
    }
}

impl ReadBinaryDep for Class2Record<'_> {
    type Args<'a> = (ValueFormat, ValueFormat, ReadScope<'a>);
    type HostType<'a> = Class2Record<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        (value_format1, value_format2, subtable): (ValueFormat, ValueFormat, ReadScope<'a>),
    ) -> Result<Class2Record<'a>, ParseError> {
        let value_record1 = ctxt.read_dep::<ValueRecord<'a>>((value_format1, subtable))?;
        let value_record2 = ctxt.read_dep::<ValueRecord<'a>>((value_format2, subtable))?;
        Ok(Class2Record {
            value_record1,
            value_record2,
        })
    }
}

impl ReadFixedSizeDep for Class2Record<'_> {
    fn size((value_format1, value_format2, _): Self::Args<'_>) -> usize {
        value_format1.size() + value_format2.size()
    }
}

impl ReadFrom for EntryExitRecord {
    type ReadType = (U16Be, U16Be);

    fn read_from((entry_anchor_offset, exit_anchor_offset): (u16, u16)) -> Self {
        EntryExitRecord {
            entry_anchor_offset,
            exit_anchor_offset,
        }
    }
}

impl ReadBinary for CursivePos<'_> {
    type HostType<'a> = CursivePos<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<CursivePos<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let entry_exit_count = usize::from(ctxt.read_u16be()?);
                let entry_exit_records = ctxt.read_array::<EntryExitRecord>(entry_exit_count)?;
                Ok(CursivePos {
                    scope,
                    coverage,
                    entry_exit_records,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> CursivePos<'a> {
    /// The entry and exit anchors of `glyph`, `None` when it is not covered.
    #[allow(clippy::type_complexity)]
    pub fn entry_exit(
        &self,
        glyph: u16,
    ) -> Result<Option<(Option<Anchor<'a>>, Option<Anchor<'a>>)>, ParseError> {
        let coverage_index = match self.coverage.glyph_coverage_value(glyph) {
            Some(coverage_index) => usize::from(coverage_index),
            None => return Ok(None),
        };
        let record = self.entry_exit_records.item(coverage_index)?;
        let entry = read_optional::<Anchor<'_>>(&self.scope, usize::from(record.entry_anchor_offset))?;
        let exit = read_optional::<Anchor<'_>>(&self.scope, usize::from(record.exit_anchor_offset))?;
        Ok(Some((entry, exit)))
    }

    /// The exit anchor of `glyph1` and the entry anchor of `glyph2`, when both exist.
    pub fn apply(
        &self,
        glyph1: u16,
        glyph2: u16,
    ) -> Result<Option<(Anchor<'a>, Anchor<'a>)>, ParseError> {
        let exit = match self.entry_exit(glyph1)? {
            Some((_, Some(exit))) => exit,
            _ => return Ok(None),
        };
        match self.entry_exit(glyph2)? {
            Some((Some(entry), _)) => Ok(Some((exit, entry))),
            _ => Ok(None),
        }
    }
}

impl ReadBinary for MarkBasePos<'_> {
    type HostType<'a> = MarkBasePos<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<MarkBasePos<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let mark_coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let base_coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let mark_class_count = usize::from(ctxt.read_u16be()?);
                let mark_array_offset = usize::from(ctxt.read_u16be()?);
                let base_array_offset = usize::from(ctxt.read_u16be()?);
                let mark_array = scope.offset_checked(mark_array_offset)?.read::<MarkArray<'_>>()?;
                let base_array = scope
                    .offset_checked(base_array_offset)?
                    .read_dep::<AnchorMatrix<'_>>(mark_class_count)?;
                Ok(MarkBasePos {
                    mark_coverage,
                    base_coverage,
                    mark_class_count,
                    mark_array,
                    base_array,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

/// The mark record and anchor of a covered mark glyph.
fn mark_anchor<'a>(
    mark_coverage: &Coverage<'a>,
    mark_array: &MarkArray<'a>,
    mark_class_count: usize,
    mark_glyph: u16,
) -> Result<Option<(usize, Anchor<'a>)>, ParseError> {
    let mark_index = match mark_coverage.glyph_coverage_value(mark_glyph) {
        Some(mark_index) => usize::from(mark_index),
        None => return Ok(None),
    };
    let mark_class = usize::from(mark_array.mark_class(mark_index)?);
    if mark_class >= mark_class_count {
        return Err(ParseError::BadIndex);
    }
    Ok(mark_array
        .anchor(mark_index)?
        .map(|anchor| (mark_class, anchor)))
}

impl<'a> MarkBasePos<'a> {
    pub fn mark_array(&self) -> &MarkArray<'a> {
        &self.mark_array
    }

    pub fn base_array(&self) -> &AnchorMatrix<'a> {
        &self.base_array
    }

    /// The base anchor and mark anchor attaching `mark_glyph` to `base_glyph`.
    pub fn apply(
        &self,
        base_glyph: u16,
        mark_glyph: u16,
    ) -> Result<Option<(Anchor<'a>, Anchor<'a>)>, ParseError> {
        let base_index = match self.base_coverage.glyph_coverage_value(base_glyph) {
            Some(base_index) => usize::from(base_index),
            None => return Ok(None),
        };
        let (mark_class, mark_anchor) = match mark_anchor(
            &self.mark_coverage,
            &self.mark_array,
            self.mark_class_count,
            mark_glyph,
        )? {
            Some(mark) => mark,
            None => return Ok(None),
        };
        Ok(self
            .base_array
            .anchor(base_index, mark_class)?
            .map(|base_anchor| (base_anchor, mark_anchor)))
    }
}

impl ReadBinary for MarkLigPos<'_> {
    type HostType<'a> = MarkLigPos<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<MarkLigPos<'a>, ParseError> {
        let scope = ctxt.scope();
        match ctxt.read_u16be()? {
            1 => {
                let mark_coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let ligature_coverage = read_coverage(&scope, ctxt.read_u16be()?)?;
                let mark_class_count = usize::from(ctxt.read_u16be()?);
                let mark_array_offset = usize::from(ctxt.read_u16be()?);
                let ligature_array_offset = usize::from(ctxt.read_u16be()?);
                let mark_array = scope.offset_checked(mark_array_offset)?.read::<MarkArray<'_>>()?;
                let ligature_array = scope
                    .offset_checked(ligature_array_offset)?
                    .read_dep::<LigatureArray<'_>>(mark_class_count)?;
                Ok(MarkLigPos {
                    mark_coverage,
                    ligature_coverage,
                    mark_class_count,
                    mark_array,
                    ligature_array,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> MarkLigPos<'a> {
    pub fn ligature_array(&self) -> &LigatureArray<'a> {
        &self.ligature_array
    }

    /// The anchors attaching `mark_glyph` to component `component_index` of `ligature_glyph`.
    pub fn apply(
        &self,
        ligature_glyph: u16,
        mark_glyph: u16,
        component_index: usize,
    ) -> Result<Option<(Anchor<'a>, Anchor<'a>)>, ParseError> {
        let ligature_index = match self.ligature_coverage.glyph_coverage_value(ligature_glyph) {
            Some(ligature_index) => usize::from(ligature_index),
            None => return Ok(None),
        };
        let (mark_class, mark_anchor) = match mark_anchor(
            &self.mark_coverage,
            &self.mark_array,
            self.mark_class_count,
            mark_glyph,
        )? {
            Some(mark) => mark,
            None => return Ok(None),
        };
        let ligature_attach = self.ligature_array.ligature_attach(ligature_index)?;
        if component_index >= ligature_attach.rows() {
            return Ok(None);
        }
        Ok(ligature_attach
            .anchor(component_index, mark_class)?
            .map(|ligature_anchor| (ligature_anchor, mark_anchor)))
    }
}

impl ReadBinaryDep for LigatureArray<'_> {
    type Args<'a> = usize;
    type HostType<'a> = LigatureArray<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        mark_class_count: usize,
    ) -> Result<LigatureArray<'a>, ParseError> {
        let scope = ctxt.scope();
        let ligature_count = usize::from(ctxt.read_u16be()?);
        let ligature_attach_offsets = ctxt.read_array::<U16Be>(ligature_count)?;
        Ok(LigatureArray {
            scope,
            mark_class_count,
            ligature_attach_offsets,
        })
    }
}

impl<'a> LigatureArray<'a> {
    pub fn len(&self) -> usize {
        self.ligature_attach_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ligature_attach_offsets.is_empty()
    }

    /// The component anchors of ligature `index`, one row per component.
    pub fn ligature_attach(&self, index: usize) -> Result<AnchorMatrix<'a>, ParseError> {
        let offset = usize::from(self.ligature_attach_offsets.item(index)?);
        self.scope
            .offset_checked(offset)?
            .read_dep::<AnchorMatrix<'_>>(self.mark_class_count)
    }
}

impl ReadBinaryDep for PosLookupSubtable<'_> {
    type Args<'a> = PosLookupType;
    type HostType<'a> = PosLookupSubtable<'a>;

    fn read_dep<'a>(
        ctxt: &mut ReadCtxt<'a>,
        lookup_type: PosLookupType,
    ) -> Result<PosLookupSubtable<'a>, ParseError> {
        match lookup_type {
            PosLookupType::SinglePos => ctxt.read::<SinglePos<'_>>().map(PosLookupSubtable::SinglePos),
            PosLookupType::PairPos => ctxt.read::<PairPos<'_>>().map(PosLookupSubtable::PairPos),
            PosLookupType::CursivePos => {
                ctxt.read::<CursivePos<'_>>().map(PosLookupSubtable::CursivePos)
            }
            PosLookupType::MarkBasePos => {
                ctxt.read::<MarkBasePos<'_>>().map(PosLookupSubtable::MarkBasePos)
            }
            PosLookupType::MarkLigPos => {
                ctxt.read::<MarkLigPos<'_>>().map(PosLookupSubtable::MarkLigPos)
            }
            PosLookupType::MarkMarkPos => {
                ctxt.read::<MarkMarkPos<'_>>().map(PosLookupSubtable::MarkMarkPos)
            }
            PosLookupType::ContextPos => ctxt
                .read::<SequenceContext<'_, GPOS>>()
                .map(PosLookupSubtable::ContextPos),
            PosLookupType::ChainContextPos => ctxt
                .read::<ChainedSequenceContext<'_, GPOS>>()
                .map(PosLookupSubtable::ChainContextPos),
        }
    }
}
