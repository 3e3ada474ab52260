use otview::binary::read::ReadScope;
use otview::error::ParseError;
use otview::gsub::SubstLookupSubtable;
use otview::layout::{LayoutTable, LookupType, SubstLookupType, GSUB};
use otview::tag;

mod common;

use common::words;

/// A GSUB table with one script (`latn`) whose default language system enables `liga` (a
/// ligature lookup) and `smcp` (a single substitution behind an extension lookup).
#[rustfmt::skip]
fn gsub_data() -> Vec<u8> {
    words(&[
        // header
        1, 0, 10, 32, 58,
        // script list @ 10
        1, 0x6C61, 0x746E, 8,
        // script @ 18
        4, 0,
        // default language system @ 22
        0, 0xFFFF, 2, 0, 1,
        // feature list @ 32
        2, 0x6C69, 0x6761, 14, 0x736D, 0x6370, 20,
        // liga @ 46, smcp @ 52
        0, 1, 0,
        0, 1, 1,
        // lookup list @ 58
        2, 6, 38,
        // lookup 0 @ 64: ligature substitution
        4, 0, 1, 8,
        1, 8, 1, 14,
        1, 1, 10,
        1, 4,
        100, 2, 11,
        // lookup 1 @ 96: extension to single substitution
        7, 0, 1, 8,
        1, 1, 0, 8,
        1, 6, 20,
        1, 2, 30, 31,
    ])
}

#[test]
fn lookup_indices_for_script() {
    let data = gsub_data();
    let gsub = ReadScope::new(&data)
        .read::<LayoutTable<'_, GSUB>>()
        .unwrap();

    let all = gsub.lookup_indices(tag::LATN, None, &[]);
    assert!(all.is_valid());
    assert_eq!(&all.into_sorted().unwrap()[..], &[0, 1]);

    let liga = gsub.lookup_indices(tag::LATN, None, &[tag::LIGA]);
    assert_eq!(&liga.into_sorted().unwrap()[..], &[0]);

    // No such script and no DFLT script to fall back to
    let mut other = gsub.lookup_indices(tag::from_bytes(*b"cyrl"), None, &[]);
    assert_eq!(other.next(), None);
    assert!(other.is_valid());
}

#[test]
fn ligature_lookup() {
    let data = gsub_data();
    let gsub = ReadScope::new(&data)
        .read::<LayoutTable<'_, GSUB>>()
        .unwrap();
    let lookup = gsub.lookup(0).unwrap();
    assert_eq!(
        lookup.lookup_type(),
        LookupType::Normal(SubstLookupType::LigatureSubst)
    );

    let subtables = lookup.read_subtables::<SubstLookupSubtable<'_>>().unwrap();
    assert_eq!(subtables.len(), 1);
    let ligature_subst = match &subtables[0] {
        SubstLookupSubtable::LigatureSubst(ligature_subst) => ligature_subst,
        _ => panic!("expected a ligature substitution"),
    };
    let ligature = ligature_subst.find_ligature(&[10, 11]).unwrap().unwrap();
    assert_eq!(ligature.ligature_glyph, 100);
    assert!(ligature_subst.find_ligature(&[10, 12]).unwrap().is_none());
    assert!(ligature_subst.find_ligature(&[11]).unwrap().is_none());
}

#[test]
fn extension_lookup() {
    let data = gsub_data();
    let gsub = ReadScope::new(&data)
        .read::<LayoutTable<'_, GSUB>>()
        .unwrap();
    let lookup = gsub.lookup(1).unwrap();
    assert_eq!(lookup.lookup_type(), LookupType::Extension);
    assert_eq!(
        lookup.resolved_lookup_type(),
        Ok(SubstLookupType::SingleSubst)
    );

    let subtables = lookup.read_subtables::<SubstLookupSubtable<'_>>().unwrap();
    match &subtables[..] {
        [SubstLookupSubtable::SingleSubst(single_subst)] => {
            assert_eq!(single_subst.apply_glyph(31).unwrap(), Some(51));
            assert_eq!(single_subst.apply_glyph(32).unwrap(), None);
        }
        _ => panic!("expected one single substitution"),
    }
}

#[test]
fn lookup_index_past_end() {
    let data = gsub_data();
    let gsub = ReadScope::new(&data)
        .read::<LayoutTable<'_, GSUB>>()
        .unwrap();
    assert_eq!(gsub.lookup(2).err(), Some(ParseError::BadIndex));
}

#[test]
fn truncated_table() {
    let data = gsub_data();
    assert!(ReadScope::new(&data[..40])
        .read::<LayoutTable<'_, GSUB>>()
        .is_err());
}
