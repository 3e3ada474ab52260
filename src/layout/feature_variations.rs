//! Feature variations: alternate feature tables selected by the variation instance.
//!
//! <https://learn.microsoft.com/en-us/typography/opentype/spec/chapter2#featurevariations-table>

use crate::binary::read::{ReadArray, ReadBinary, ReadCtxt, ReadFrom, ReadScope};
use crate::binary::{U16Be, U32Be};
use crate::error::ParseError;
use crate::layout::{read_optional, Feature};
use crate::tables::F2Dot14;

#[derive(Copy, Clone, Debug)]
pub struct FeatureVariations<'a> {
    scope: ReadScope<'a>,
    feature_variation_records: ReadArray<'a, FeatureVariationRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FeatureVariationRecord {
    pub condition_set_offset: u32,
    pub feature_table_substitution_offset: u32,
}

#[derive(Copy, Clone, Debug)]
pub struct ConditionSet<'a> {
    scope: ReadScope<'a>,
    condition_offsets: ReadArray<'a, U32Be>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Matches when the normalized coordinate of `axis_index` lies within the inclusive range.
    Format1 {
        axis_index: u16,
        filter_range_min_value: F2Dot14,
        filter_range_max_value: F2Dot14,
    },
}

#[derive(Copy, Clone, Debug)]
pub struct FeatureTableSubstitution<'a> {
    scope: ReadScope<'a>,
    substitutions: ReadArray<'a, FeatureTableSubstitutionRecord>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FeatureTableSubstitutionRecord {
    pub feature_index: u16,
    pub alternate_feature_offset: u32,
}

impl ReadFrom for FeatureVariationRecord {
    type ReadType = (U32Be, U32Be);

    fn read_from((condition_set_offset, feature_table_substitution_offset): (u32, u32)) -> Self {
        FeatureVariationRecord {
            condition_set_offset,
            feature_table_substitution_offset,
        }
    }
}

impl ReadFrom for FeatureTableSubstitutionRecord {
    type ReadType = (U16Be, U32Be);

    fn read_from((feature_index, alternate_feature_offset): (u16, u32)) -> Self {
        FeatureTableSubstitutionRecord {
            feature_index,
            alternate_feature_offset,
        }
    }
}

impl ReadBinary for FeatureVariations<'_> {
    type HostType<'a> = FeatureVariations<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<FeatureVariations<'a>, ParseError> {
        let scope = ctxt.scope();
        let major_version = ctxt.read_u16be()?;
        let _minor_version = ctxt.read_u16be()?;
        ctxt.check_version(major_version == 1)?;
        let record_count = usize::try_from(ctxt.read_u32be()?)?;
        let feature_variation_records = ctxt.read_array::<FeatureVariationRecord>(record_count)?;
        Ok(FeatureVariations {
            scope,
            feature_variation_records,
        })
    }
}

impl<'a> FeatureVariations<'a> {
    pub fn records(&self) -> &ReadArray<'a, FeatureVariationRecord> {
        &self.feature_variation_records
    }

    /// The condition set of `record`. A null offset is `None`, which matches every instance.
    pub fn condition_set(
        &self,
        record: &FeatureVariationRecord,
    ) -> Result<Option<ConditionSet<'a>>, ParseError> {
        let offset = usize::try_from(record.condition_set_offset)?;
        read_optional::<ConditionSet<'_>>(&self.scope, offset)
    }

    pub fn feature_table_substitution(
        &self,
        record: &FeatureVariationRecord,
    ) -> Result<Option<FeatureTableSubstitution<'a>>, ParseError> {
        let offset = usize::try_from(record.feature_table_substitution_offset)?;
        read_optional::<FeatureTableSubstitution<'_>>(&self.scope, offset)
    }

    /// The substitutions of the first record whose conditions hold for `coords`.
    pub fn find_substitutions(
        &self,
        coords: &[F2Dot14],
    ) -> Result<Option<FeatureTableSubstitution<'a>>, ParseError> {
        for record in self.feature_variation_records.iter() {
            let matches = match self.condition_set(&record)? {
                Some(condition_set) => condition_set.matches(coords)?,
                None => true,
            };
            if matches {
                return self.feature_table_substitution(&record);
            }
        }
        Ok(None)
    }
}

impl ReadBinary for ConditionSet<'_> {
    type HostType<'a> = ConditionSet<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<ConditionSet<'a>, ParseError> {
        let scope = ctxt.scope();
        let condition_count = usize::from(ctxt.read_u16be()?);
        let condition_offsets = ctxt.read_array::<U32Be>(condition_count)?;
        Ok(ConditionSet {
            scope,
            condition_offsets,
        })
    }
}

impl<'a> ConditionSet<'a> {
    pub fn len(&self) -> usize {
        self.condition_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.condition_offsets.is_empty()
    }

    pub fn condition(&self, index: usize) -> Result<Condition, ParseError> {
        let offset = usize::try_from(self.condition_offsets.item(index)?)?;
        self.scope.offset_checked(offset)?.read::<Condition>()
    }

    pub fn conditions(&self) -> impl Iterator<Item = Result<Condition, ParseError>> + 'a {
        let condition_set = *self;
        (0..self.len()).map(move |index| condition_set.condition(index))
    }

    /// True when every condition holds. Axes missing from `coords` are at the default, 0.
    pub fn matches(&self, coords: &[F2Dot14]) -> Result<bool, ParseError> {
        for condition in self.conditions() {
            if !condition?.matches(coords) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl ReadBinary for Condition {
    type HostType<'a> = Condition;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<Condition, ParseError> {
        match ctxt.read_u16be()? {
            1 => {
                let axis_index = ctxt.read_u16be()?;
                let filter_range_min_value = ctxt.read::<F2Dot14>()?;
                let filter_range_max_value = ctxt.read::<F2Dot14>()?;
                Ok(Condition::Format1 {
                    axis_index,
                    filter_range_min_value,
                    filter_range_max_value,
                })
            }
            _ => Err(ParseError::BadVersion),
        }
    }
}

impl Condition {
    pub fn matches(&self, coords: &[F2Dot14]) -> bool {
        match *self {
            Condition::Format1 {
                axis_index,
                filter_range_min_value,
                filter_range_max_value,
            } => {
                // Compare as signed 2.14 values.
                let coord = coords
                    .get(usize::from(axis_index))
                    .map_or(0, |coord| coord.raw_value() as i16);
                let min = filter_range_min_value.raw_value() as i16;
                let max = filter_range_max_value.raw_value() as i16;
                min <= coord && coord <= max
            }
        }
    }
}

impl ReadBinary for FeatureTableSubstitution<'_> {
    type HostType<'a> = FeatureTableSubstitution<'a>;

    fn read<'a>(ctxt: &mut ReadCtxt<'a>) -> Result<FeatureTableSubstitution<'a>, ParseError> {
        let scope = ctxt.scope();
        let major_version = ctxt.read_u16be()?;
        let _minor_version = ctxt.read_u16be()?;
        ctxt.check_version(major_version == 1)?;
        let substitution_count = usize::from(ctxt.read_u16be()?);
        let substitutions = ctxt.read_array::<FeatureTableSubstitutionRecord>(substitution_count)?;
        Ok(FeatureTableSubstitution {
            scope,
            substitutions,
        })
    }
}

impl<'a> FeatureTableSubstitution<'a> {
    pub fn substitutions(&self) -> &ReadArray<'a, FeatureTableSubstitutionRecord> {
        &self.substitutions
    }

    /// The feature table replacing `feature_index`, if this substitution covers it.
    ///
    /// Records are sorted by feature index.
    pub fn alternate_feature(&self, feature_index: u16) -> Result<Option<Feature<'a>>, ParseError> {
        let record = match self
            .substitutions
            .binary_search_by(|record| record.feature_index.cmp(&feature_index))
        {
            Ok(index) => self.substitutions.item(index)?,
            Err(_) => return Ok(None),
        };
        let offset = usize::try_from(record.alternate_feature_offset)?;
        self.scope.offset_checked(offset)?.read::<Feature<'_>>().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::writer::{TtfType::*, Writer};

    /// Two records: the first applies for wght in [0.5, 1.0] and swaps feature 1 for a feature
    /// with lookup 7, the second has no conditions and substitutes nothing.
    fn feature_variations() -> Vec<u8> {
        let mut w = Writer::new();
        w.write_all(&[UInt16(1), UInt16(0), UInt32(2)]);
        w.write_all(&[UInt32(24), UInt32(38), UInt32(0), UInt32(56)]);
        // condition set at 24
        w.write_all(&[UInt16(1), UInt32(6)]);
        w.write_all(&[UInt16(1), UInt16(0), UInt16(0x2000), UInt16(0x4000)]);
        // substitution at 38
        w.write_all(&[UInt16(1), UInt16(0), UInt16(1), UInt16(1), UInt32(12)]);
        w.u16s(&[0, 1, 7]);
        // empty substitution at 56
        w.write_all(&[UInt16(1), UInt16(0), UInt16(0)]);
        w.data
    }

    #[test]
    fn selects_first_matching_record() {
        let data = feature_variations();
        let variations = ReadScope::new(&data)
            .read::<FeatureVariations<'_>>()
            .unwrap();

        let heavy = [F2Dot14::new(0x3000)];
        let substitution = variations.find_substitutions(&heavy).unwrap().unwrap();
        let feature = substitution.alternate_feature(1).unwrap().unwrap();
        assert_eq!(feature.lookup_indices().to_vec(), vec![7]);
        assert!(substitution.alternate_feature(0).unwrap().is_none());

        // Default instance falls through to the unconditional record.
        let substitution = variations.find_substitutions(&[]).unwrap().unwrap();
        assert!(substitution.substitutions().is_empty());
    }

    #[test]
    fn condition_set_conditions() {
        let data = feature_variations();
        let conditions = {
            let condition_set = ReadScope::new(&data[24..])
                .read::<ConditionSet<'_>>()
                .unwrap();
            condition_set.conditions()
        };
        assert_eq!(
            conditions.collect::<Result<Vec<_>, _>>(),
            Ok(vec![Condition::Format1 {
                axis_index: 0,
                filter_range_min_value: F2Dot14::new(0x2000),
                filter_range_max_value: F2Dot14::new(0x4000),
            }])
        );
    }

    #[test]
    fn condition_bounds_are_inclusive_and_signed() {
        let condition = Condition::Format1 {
            axis_index: 1,
            filter_range_min_value: F2Dot14::new(0xC000),
            filter_range_max_value: F2Dot14::new(0x0000),
        };
        assert!(condition.matches(&[]));
        assert!(condition.matches(&[F2Dot14::new(0x4000), F2Dot14::new(0xC000)]));
        assert!(!condition.matches(&[F2Dot14::new(0), F2Dot14::new(0x0001)]));
        assert!(!condition.matches(&[F2Dot14::new(0), F2Dot14::new(0x8000)]));
    }

    #[test]
    fn unknown_condition_format() {
        let data = [0, 2, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            ReadScope::new(&data).read::<Condition>(),
            Err(ParseError::BadVersion)
        );
    }
}
