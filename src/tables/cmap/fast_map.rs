//! Owned, pre-validated form of a cmap subtable for repeated lookups.

use itertools::Itertools;
use log::warn;

use super::{CmapSubtable, Format4};
use crate::error::ParseError;

/// A cmap subtable copied out of the font data and checked once so that every later lookup is
/// infallible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FastMap {
    /// Formats 8, 10, 12 and 13: sorted, non-overlapping groups.
    Groups {
        kind: GroupKind,
        groups: Vec<Group>,
    },
    /// Format 4.
    Segments {
        segments: Vec<Segment>,
        glyph_id_array: Vec<u16>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind {
    /// Consecutive code points map to consecutive glyphs starting at `value`.
    Sequential,
    /// Every code point maps to `value`.
    Constant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub start: u32,
    pub end: u32,
    pub value: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: u16,
    pub end: u16,
    pub delta: i16,
    /// Index into the glyph id array of the glyph for `start`.
    pub glyph_array_base: Option<usize>,
}

impl FastMap {
    pub fn build(subtable: &CmapSubtable<'_>) -> Result<FastMap, ParseError> {
        match *subtable {
            CmapSubtable::Format4(ref format4) => build_segments(format4),
            CmapSubtable::Format8 { ref groups, .. }
            | CmapSubtable::Format12 { ref groups, .. } => {
                let groups = groups
                    .iter()
                    .map(|group| -> Result<Group, ParseError> {
                        check_range(group.start_char_code, group.end_char_code)?;
                        let last_glyph = group
                            .start_glyph_id
                            .checked_add(group.end_char_code - group.start_char_code)
                            .ok_or(ParseError::BadValue)?;
                        u16::try_from(last_glyph)?;
                        Ok(Group {
                            start: group.start_char_code,
                            end: group.end_char_code,
                            value: u16::try_from(group.start_glyph_id)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                sorted_groups(GroupKind::Sequential, groups)
            }
            CmapSubtable::Format13 { ref groups, .. } => {
                let groups = groups
                    .iter()
                    .map(|group| -> Result<Group, ParseError> {
                        check_range(group.start_char_code, group.end_char_code)?;
                        Ok(Group {
                            start: group.start_char_code,
                            end: group.end_char_code,
                            value: u16::try_from(group.glyph_id)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                sorted_groups(GroupKind::Constant, groups)
            }
            CmapSubtable::Format10 {
                start_char_code,
                ref glyph_id_array,
                ..
            } => {
                let entries = glyph_id_array
                    .iter()
                    .enumerate()
                    .map(|(index, glyph_id)| -> Result<(u32, u16), ParseError> {
                        let ch = u32::try_from(index)
                            .ok()
                            .and_then(|index| start_char_code.checked_add(index))
                            .ok_or(ParseError::BadValue)?;
                        Ok((ch, glyph_id))
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;

                // Runs of consecutive glyphs share the difference between code point and glyph.
                let runs = entries
                    .iter()
                    .group_by(|&&(ch, glyph_id)| ch.wrapping_sub(u32::from(glyph_id)));
                let mut groups = Vec::new();
                for (_, mut run) in &runs {
                    let (mut start, mut value) = match run.next() {
                        Some(&entry) => entry,
                        None => continue,
                    };
                    let end = run.last().map_or(start, |&(ch, _)| ch);
                    // Glyph 0 can only begin a run
                    if value == 0 {
                        if start == end {
                            continue;
                        }
                        start += 1;
                        value = 1;
                    }
                    groups.push(Group { start, end, value });
                }
                Ok(FastMap::Groups {
                    kind: GroupKind::Sequential,
                    groups,
                })
            }
            _ => {
                warn!(
                    "cmap subtable format {} has no fast map representation",
                    subtable.format()
                );
                Err(ParseError::UnsuitableCmap)
            }
        }
    }

    /// Map `ch` to a glyph index, 0 when the code point is not mapped.
    pub fn map(&self, ch: u32) -> u16 {
        match self {
            FastMap::Groups { kind, groups } => {
                let index = groups.partition_point(|group| group.end < ch);
                match groups.get(index) {
                    Some(group) if group.start <= ch => match kind {
                        // Construction checked the last glyph of every group fits.
                        GroupKind::Sequential => {
                            group.value.wrapping_add((ch - group.start) as u16)
                        }
                        GroupKind::Constant => group.value,
                    },
                    _ => 0,
                }
            }
            FastMap::Segments {
                segments,
                glyph_id_array,
            } => {
                let ch = match u16::try_from(ch) {
                    Ok(ch) => ch,
                    Err(_) => return 0,
                };
                let index = segments.partition_point(|segment| segment.end < ch);
                let segment = match segments.get(index) {
                    Some(segment) if segment.start <= ch => segment,
                    _ => return 0,
                };
                match segment.glyph_array_base {
                    None => ch.wrapping_add_signed(segment.delta),
                    Some(base) => {
                        let glyph_id = glyph_id_array
                            .get(base + usize::from(ch - segment.start))
                            .copied()
                            .unwrap_or(0);
                        if glyph_id == 0 {
                            0
                        } else {
                            glyph_id.wrapping_add_signed(segment.delta)
                        }
                    }
                }
            }
        }
    }
}

fn check_range(start: u32, end: u32) -> Result<(), ParseError> {
    if start > end {
        Err(ParseError::BadValue)
    } else {
        Ok(())
    }
}

fn sorted_groups(kind: GroupKind, groups: Vec<Group>) -> Result<FastMap, ParseError> {
    if groups.iter().tuple_windows().any(|(a, b)| b.start <= a.end) {
        return Err(ParseError::BadValue);
    }
    Ok(FastMap::Groups { kind, groups })
}

fn build_segments(format4: &Format4<'_>) -> Result<FastMap, ParseError> {
    let glyph_id_array = format4.glyph_id_array.to_vec();
    let mut segments = Vec::with_capacity(format4.seg_count());
    let mut prev_end = None;
    for index in 0..format4.seg_count() {
        let segment = format4.segment(index)?;
        if segment.start_code > segment.end_code {
            return Err(ParseError::BadValue);
        }
        if prev_end.is_some_and(|prev_end| segment.start_code <= prev_end) {
            return Err(ParseError::BadValue);
        }
        let glyph_array_base = format4.glyph_array_base(index, &segment)?;
        if let Some(base) = glyph_array_base {
            let last = base + usize::from(segment.end_code - segment.start_code);
            if last >= glyph_id_array.len() {
                return Err(ParseError::BadIndex);
            }
        }
        segments.push(Segment {
            start: segment.start_code,
            end: segment.end_code,
            delta: segment.id_delta,
            glyph_array_base,
        });
        prev_end = Some(segment.end_code);
    }
    Ok(FastMap::Segments {
        segments,
        glyph_id_array,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read::ReadScope;
    use crate::tables::cmap::tests::{format12_data, format4_data};
    use crate::tests::writer::{TtfType::*, Writer};

    fn read_subtable(data: &[u8]) -> CmapSubtable<'_> {
        ReadScope::new(data).read::<CmapSubtable<'_>>().unwrap()
    }

    fn assert_same_mapping(
        subtable: &CmapSubtable<'_>,
        fast_map: &FastMap,
        range: std::ops::Range<u32>,
    ) {
        for ch in range {
            assert_eq!(Ok(fast_map.map(ch)), subtable.map(ch), "code point {:#x}", ch);
        }
    }

    #[test]
    fn format4_matches_subtable() {
        let data = format4_data();
        let subtable = read_subtable(&data);
        let fast_map = FastMap::build(&subtable).unwrap();
        match &fast_map {
            FastMap::Segments { segments, glyph_id_array } => {
                assert_eq!(segments.len(), 3);
                assert_eq!(segments[1].glyph_array_base, Some(0));
                assert_eq!(glyph_id_array, &[7, 0]);
            }
            _ => panic!("expected segments"),
        }
        assert_same_mapping(&subtable, &fast_map, 0..0x100);
        assert_eq!(fast_map.map(0xFFFF), 0);
        assert_eq!(fast_map.map(0x1_0041), 0);
    }

    #[test]
    fn format4_rejects_overlapping_segments() {
        let mut data = format4_data();
        // second start code lowered below the first end code
        data[25] = 0x42;
        let subtable = read_subtable(&data);
        assert_eq!(FastMap::build(&subtable), Err(ParseError::BadValue));
    }

    #[test]
    fn format4_rejects_range_past_glyph_array() {
        let mut data = format4_data();
        // second segment end code 0x63 needs a third glyph
        data[17] = 0x63;
        let subtable = read_subtable(&data);
        assert_eq!(FastMap::build(&subtable), Err(ParseError::BadIndex));
    }

    #[test]
    fn format12_groups() {
        let data = format12_data(&[(0x20, 0x22, 1), (0x1F600, 0x1F601, 100)], 12);
        let subtable = read_subtable(&data);
        let fast_map = FastMap::build(&subtable).unwrap();
        assert_same_mapping(&subtable, &fast_map, 0..0x30);
        assert_eq!(fast_map.map(0x1F601), 101);
        assert_eq!(fast_map.map(0x1F602), 0);
    }

    #[test]
    fn format12_rejects_bad_groups() {
        for groups in [
            &[(0x22, 0x20, 1)][..],
            &[(0x20, 0x22, 1), (0x22, 0x30, 5)][..],
            &[(0x30, 0x32, 1), (0x20, 0x22, 5)][..],
            &[(0x20, 0x22, 0xFFFE)][..],
        ] {
            let data = format12_data(groups, 12);
            let subtable = read_subtable(&data);
            assert_eq!(FastMap::build(&subtable), Err(ParseError::BadValue), "{:?}", groups);
        }
    }

    #[test]
    fn format13_constant_groups() {
        let data = format12_data(&[(0x10, 0x1F, 3), (0x30, 0x30, 9)], 13);
        let subtable = read_subtable(&data);
        let fast_map = FastMap::build(&subtable).unwrap();
        assert_same_mapping(&subtable, &fast_map, 0..0x40);
    }

    #[test]
    fn format10_runs() {
        let mut w = Writer::new();
        w.write_all(&[
            UInt16(10),
            UInt16(0),
            UInt32(32),
            UInt32(0),
            UInt32(0x100),
            UInt32(6),
        ]);
        w.u16s(&[0, 1, 2, 9, 0, 4]);
        let subtable = read_subtable(&w.data);
        let fast_map = FastMap::build(&subtable).unwrap();
        assert_eq!(
            fast_map,
            FastMap::Groups {
                kind: GroupKind::Sequential,
                groups: vec![
                    Group { start: 0x101, end: 0x102, value: 1 },
                    Group { start: 0x103, end: 0x103, value: 9 },
                    Group { start: 0x105, end: 0x105, value: 4 },
                ],
            }
        );
        assert_same_mapping(&subtable, &fast_map, 0xF0..0x110);
    }

    #[test]
    fn unsuitable_format() {
        let data = [0, 6, 0, 10, 0, 0, 0, 0x30, 0, 0];
        let subtable = read_subtable(&data);
        assert_eq!(FastMap::build(&subtable), Err(ParseError::UnsuitableCmap));
    }
}
