//! Coverage and class definition tables.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-table>
//!
//! Both tables are views over the backing buffer. Construction checks that the declared arrays
//! fit; the ordering of glyphs and ranges is trusted and relied upon by binary search. A table
//! that violates the ordering produces wrong answers, never a fault.

use std::cmp::Ordering;

use crate::binary::read::{ReadArray, ReadBinary, ReadCtxt, ReadFrom};
use crate::binary::U16Be;
use crate::error::ParseError;

#[derive(Copy, Clone, Debug)]
pub enum Coverage<'a> {
    Format1 {
        glyph_array: ReadArray<'a, U16Be>,
    },
    Format2 {
        coverage_range_array: ReadArray<'a, CoverageRangeRecord>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CoverageRangeRecord {
    pub start_glyph: u16,
    pub end_glyph: u16,
    pub start_coverage_index: u16,
}

#[derive(Copy, Clone, Debug)]
pub enum ClassDef<'a> {
    Format1 {
        start_glyph: u16,
        class_value_array: ReadArray<'a, U16Be>,
    },
    Format2 {
        class_range_array: ReadArray<'a, ClassRangeRecord>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClassRangeRecord {
    pub start_glyph: u16,
    pub end_glyph: u16,
    pub class_value: u16,
}

impl ReadFrom for CoverageRangeRecord {
    type ReadType = (U16Be, U16Be, U16Be);
    fn read_from((start_glyph, end_glyph, start_coverage_index): (u16, u16, u16)) -> Self {
        CoverageRangeRecord {
            start_glyph,
            end_glyph,
            start_coverage_index,
        }
    }
}

impl ReadFrom for ClassRangeRecord {
    type ReadType = (U16Be, U16Be, U16Be);
    fn read_from((start_glyph, end_glyph, class_value): (u16, u16, u16)) -> Self {
        ClassRangeRecord {
            start_glyph,
            end_glyph,
            class_value,
        }
    }
}

/// Ordering of `glyph` relative to the inclusive range `start..=end`, from the point of view of
/// the range. Suitable for `binary_search_by`.
fn range_cmp(start: u16, end: u16, glyph: u16) -> Ordering {
    if glyph < start {
        Ordering::Greater
    } else if glyph > end {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

impl ReadBinary for Coverage<'_> {
    type HostType<'a> = Coverage<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Coverage<'a>, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let glyph_array = ctxt.read_array::<U16Be>(glyph_count)?;
                Ok(Coverage::Format1 { glyph_array })
            }
            2 => {
                let coverage_range_count = usize::from(ctxt.read_u16be()?);
                let coverage_range_array =
                    ctxt.read_array::<CoverageRangeRecord>(coverage_range_count)?;
                Ok(Coverage::Format2 {
                    coverage_range_array,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> Coverage<'a> {
    /// Returns the coverage index of `glyph`, or `None` if it is not covered.
    pub fn glyph_coverage_value(&self, glyph: u16) -> Option<u16> {
        match self {
            // The glyph indices must be in numerical order for binary searching of the list.
            // https://docs.microsoft.com/en-us/typography/opentype/spec/chapter2#coverage-format-1
            Coverage::Format1 { glyph_array } => glyph_array
                .binary_search_by(|candidate| candidate.cmp(&glyph))
                .ok()
                .and_then(|index| u16::try_from(index).ok()),
            Coverage::Format2 {
                coverage_range_array,
            } => {
                let index = coverage_range_array
                    .binary_search_by(|range| range_cmp(range.start_glyph, range.end_glyph, glyph))
                    .ok()?;
                let range = coverage_range_array.get_item(index)?;
                range
                    .start_coverage_index
                    .checked_add(glyph - range.start_glyph)
            }
        }
    }

    pub fn contains(&self, glyph: u16) -> bool {
        self.glyph_coverage_value(glyph).is_some()
    }

    /// Convenience method to count the total number of glyphs covered
    pub fn glyph_count(&self) -> usize {
        match self {
            Coverage::Format1 { glyph_array } => glyph_array.len(),
            Coverage::Format2 {
                coverage_range_array,
            } => coverage_range_array
                .iter()
                .filter(|range| range.start_glyph <= range.end_glyph)
                .map(|range| usize::from(range.end_glyph - range.start_glyph) + 1)
                .sum(),
        }
    }

    /// The covered glyphs in coverage index order.
    pub fn glyphs(&self) -> impl Iterator<Item = u16> + 'a {
        let (format1, format2) = match self {
            Coverage::Format1 { glyph_array } => (Some(glyph_array.iter()), None),
            Coverage::Format2 {
                coverage_range_array,
            } => (None, Some(coverage_range_array.iter())),
        };
        format1.into_iter().flatten().chain(
            format2
                .into_iter()
                .flatten()
                .flat_map(|range| range.start_glyph..=range.end_glyph),
        )
    }
}

impl ReadBinary for ClassDef<'_> {
    type HostType<'a> = ClassDef<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ClassDef<'a>, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let start_glyph = ctxt.read_u16be()?;
                let glyph_count = usize::from(ctxt.read_u16be()?);
                let class_value_array = ctxt.read_array::<U16Be>(glyph_count)?;
                Ok(ClassDef::Format1 {
                    start_glyph,
                    class_value_array,
                })
            }
            2 => {
                let class_range_count = usize::from(ctxt.read_u16be()?);
                let class_range_array = ctxt.read_array::<ClassRangeRecord>(class_range_count)?;
                Ok(ClassDef::Format2 { class_range_array })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl<'a> ClassDef<'a> {
    /// A class definition assigning every glyph to class 0.
    pub fn empty() -> ClassDef<'a> {
        ClassDef::Format2 {
            class_range_array: ReadArray::empty(),
        }
    }

    /// Returns the class of `glyph`. Glyphs not assigned a class are in class 0.
    pub fn glyph_class_value(&self, glyph: u16) -> u16 {
        match self {
            ClassDef::Format1 {
                start_glyph,
                class_value_array,
            } => glyph
                .checked_sub(*start_glyph)
                .and_then(|index| class_value_array.get_item(usize::from(index)))
                .unwrap_or(0),
            ClassDef::Format2 { class_range_array } => class_range_array
                .binary_search_by(|range| range_cmp(range.start_glyph, range.end_glyph, glyph))
                .ok()
                .and_then(|index| class_range_array.get_item(index))
                .map_or(0, |range| range.class_value),
        }
    }
}
