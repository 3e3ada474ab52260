//! Glyph to code point maps derived from cmap subtables.

use log::warn;

use super::{CmapSubtable, ConstantMapGroup, Format14, Format4, SequentialMapGroup};
use crate::error::ParseError;

const MAX_CODE_POINT: u32 = 0x10FFFF;

/// The smallest Unicode scalar value mapping to each glyph of a subtable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReverseMap {
    code_points: Vec<Option<u32>>,
}

/// The first variation sequence mapping to each glyph of a format 14 subtable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariationReverseMap {
    sequences: Vec<Option<(u32, u32)>>,
}

impl ReverseMap {
    /// Build the map for glyphs `0..glyph_count`.
    ///
    /// Glyph 0 and glyphs outside the range are never recorded.
    pub fn build(subtable: &CmapSubtable<'_>, glyph_count: u16) -> Result<ReverseMap, ParseError> {
        if glyph_count == 0 {
            return Err(ParseError::BadValue);
        }
        let mut map = ReverseMap {
            code_points: vec![None; usize::from(glyph_count)],
        };

        match *subtable {
            CmapSubtable::Format0 {
                ref glyph_id_array, ..
            } => {
                for (ch, glyph_id) in glyph_id_array.iter().enumerate() {
                    map.record(u16::from(glyph_id), ch as u32);
                }
            }
            CmapSubtable::Format2 { .. } => {
                for ch in 0..=u32::from(u16::MAX) {
                    map.record(subtable.map(ch)?, ch);
                }
            }
            CmapSubtable::Format4(ref format4) => map.record_format4(format4)?,
            CmapSubtable::Format6 {
                first_code,
                ref glyph_id_array,
                ..
            } => {
                for (index, glyph_id) in glyph_id_array.iter().enumerate() {
                    map.record(glyph_id, u32::from(first_code) + index as u32);
                }
            }
            CmapSubtable::Format8 { ref groups, .. }
            | CmapSubtable::Format12 { ref groups, .. } => {
                for group in groups.iter() {
                    map.record_sequential(&group)?;
                }
            }
            CmapSubtable::Format10 {
                start_char_code,
                ref glyph_id_array,
                ..
            } => {
                for (index, glyph_id) in glyph_id_array.iter().enumerate() {
                    let ch = u32::try_from(index)
                        .ok()
                        .and_then(|index| start_char_code.checked_add(index));
                    if let Some(ch) = ch {
                        map.record(glyph_id, ch);
                    }
                }
            }
            CmapSubtable::Format13 { ref groups, .. } => {
                for group in groups.iter() {
                    map.record_constant(&group)?;
                }
            }
            CmapSubtable::Format14(_) => {
                warn!("cmap format 14 has no plain mapping to reverse");
                return Err(ParseError::UnsuitableCmap);
            }
        }

        Ok(map)
    }

    /// The code point of `glyph_id`, if any maps to it.
    pub fn code_point(&self, glyph_id: u16) -> Option<u32> {
        self.code_points
            .get(usize::from(glyph_id))
            .copied()
            .flatten()
    }

    /// The number of glyphs covered, mapped or not.
    pub fn len(&self) -> usize {
        self.code_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_points.is_empty()
    }

    fn record(&mut self, glyph_id: u16, ch: u32) {
        if glyph_id == 0 || char::from_u32(ch).is_none() {
            return;
        }
        if let Some(slot) = self.code_points.get_mut(usize::from(glyph_id)) {
            if slot.map_or(true, |existing| ch < existing) {
                *slot = Some(ch);
            }
        }
    }

    fn record_format4(&mut self, format4: &Format4<'_>) -> Result<(), ParseError> {
        for index in 0..format4.seg_count() {
            let segment = format4.segment(index)?;
            if segment.start_code > segment.end_code {
                return Err(ParseError::BadValue);
            }
            if segment.start_code == 0xFFFF && segment.end_code == 0xFFFF {
                continue;
            }
            for ch in segment.start_code..=segment.end_code {
                let glyph_id = format4.segment_glyph(index, &segment, ch)?;
                self.record(glyph_id, u32::from(ch));
            }
        }
        Ok(())
    }

    fn record_sequential(&mut self, group: &SequentialMapGroup) -> Result<(), ParseError> {
        check_group(group.start_char_code, group.end_char_code)?;
        let start_glyph_id = u16::try_from(group.start_glyph_id)?;
        let span = (group.end_char_code - group.start_char_code) as usize;
        // Glyphs past the end of the map cannot be recorded.
        let count = (span + 1).min(self.len().saturating_sub(usize::from(start_glyph_id)));
        for offset in 0..count {
            self.record(
                start_glyph_id + offset as u16,
                group.start_char_code + offset as u32,
            );
        }
        Ok(())
    }

    fn record_constant(&mut self, group: &ConstantMapGroup) -> Result<(), ParseError> {
        check_group(group.start_char_code, group.end_char_code)?;
        let glyph_id = u16::try_from(group.glyph_id)?;
        self.record(glyph_id, group.start_char_code);
        Ok(())
    }
}

fn check_group(start: u32, end: u32) -> Result<(), ParseError> {
    if start > end || end > MAX_CODE_POINT {
        Err(ParseError::BadValue)
    } else {
        Ok(())
    }
}

impl VariationReverseMap {
    /// Build the map for glyphs `0..glyph_count` from the non-default variation sequences.
    pub fn build(
        format14: &Format14<'_>,
        glyph_count: u16,
    ) -> Result<VariationReverseMap, ParseError> {
        if glyph_count == 0 {
            return Err(ParseError::BadValue);
        }
        let mut sequences = vec![None; usize::from(glyph_count)];
        for record in format14.records() {
            let non_default_uvs = match format14.non_default_uvs(&record)? {
                Some(non_default_uvs) => non_default_uvs,
                None => continue,
            };
            for mapping in non_default_uvs.mappings() {
                if mapping.glyph_id == 0 || char::from_u32(mapping.unicode_value).is_none() {
                    continue;
                }
                if let Some(slot) = sequences.get_mut(usize::from(mapping.glyph_id)) {
                    if slot.is_none() {
                        *slot = Some((mapping.unicode_value, record.var_selector));
                    }
                }
            }
        }
        Ok(VariationReverseMap { sequences })
    }

    /// The (code point, variation selector) pair mapping to `glyph_id`, if any.
    pub fn sequence(&self, glyph_id: u16) -> Option<(u32, u32)> {
        self.sequences.get(usize::from(glyph_id)).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
