//! Property-based tests for the document store.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeMap;
use std::fs;

use proptest::prelude::*;
use tempfile::TempDir;

use docfile::core::format::{Codec, Format, SerdeCodec};
use docfile::core::paths::NormalizedPath;
use docfile::store::{ChangeThrottle, DocumentStore};

/// Strategy for generating document contents.
///
/// Values stay within `i64` so every format can hold them.
fn counters() -> impl Strategy<Value = BTreeMap<String, u64>> {
    prop::collection::btree_map("[a-z][a-z0-9_]{0,11}", 0..=i64::MAX as u64, 0..12)
}

/// Strategy for generating relative file names with redundant segments.
fn messy_relative_path() -> impl Strategy<Value = (String, String)> {
    ("[a-z]{1,8}", "[a-z]{1,8}").prop_map(|(dir, name)| {
        let clean = format!("{dir}/{name}.json");
        let messy = format!("./{dir}/./x/../{name}.json");
        (clean, messy)
    })
}

proptest! {
    /// Committed content decodes back to the in-memory value.
    #[test]
    fn commit_then_reopen_round_trips(
        content in counters(),
        format in prop::sample::select(vec![Format::PrettyJson, Format::CompactJson, Format::Toml]),
    ) {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::in_dir(temp.path()).unwrap();

        let mut doc = store.open_as::<BTreeMap<String, u64>>("doc.data", format).unwrap();
        doc.set_content(content.clone()).unwrap();
        doc.commit().unwrap();
        doc.release().unwrap();

        let doc = store.open_as::<BTreeMap<String, u64>>("doc.data", format).unwrap();
        prop_assert_eq!(doc.read(Clone::clone).unwrap(), content);
    }

    /// The file on disk always decodes with the document's codec.
    #[test]
    fn file_matches_codec_output(content in counters()) {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::in_dir(temp.path()).unwrap();
        let codec = SerdeCodec::new(Format::PrettyJson).unwrap();

        let mut doc = store.open::<BTreeMap<String, u64>>("c.json").unwrap();
        doc.set_content(content.clone()).unwrap();
        doc.commit().unwrap();

        let bytes = fs::read(temp.path().join("c.json")).unwrap();
        let expected = <SerdeCodec as Codec<BTreeMap<String, u64>>>::encode(&codec, &content).unwrap();
        prop_assert_eq!(bytes, expected);
    }

    /// With threshold T, commits land exactly on multiples of T.
    #[test]
    fn throttle_fires_on_multiples(threshold in 1u64..20, calls in 0u64..100) {
        let mut throttle = ChangeThrottle::new(threshold);
        let mut fired = Vec::new();

        for call in 1..=calls {
            throttle.record();
            if throttle.is_due() {
                fired.push(call);
                throttle.reset();
            }
        }

        let expected: Vec<u64> = (1..=calls).filter(|c| c % threshold == 0).collect();
        prop_assert_eq!(fired, expected);
        prop_assert_eq!(throttle.count(), calls % threshold);
    }

    /// Equivalent spellings of a path normalize to the same key.
    #[test]
    fn normalization_is_spelling_independent((clean, messy) in messy_relative_path()) {
        let temp = TempDir::new().unwrap();
        let a = NormalizedPath::resolve(clean.as_ref(), temp.path()).unwrap();
        let b = NormalizedPath::resolve(messy.as_ref(), temp.path()).unwrap();
        prop_assert_eq!(a, b);
    }

    /// N opens give refcount N; N releases close the document.
    #[test]
    fn refcount_matches_open_references(n in 1usize..16) {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::in_dir(temp.path()).unwrap();

        let mut docs: Vec<_> = (0..n)
            .map(|_| store.open::<BTreeMap<String, u64>>("c.json").unwrap())
            .collect();
        prop_assert_eq!(store.refcount("c.json").unwrap(), Some(n));

        for doc in &mut docs {
            doc.release().unwrap();
        }
        prop_assert_eq!(store.refcount("c.json").unwrap(), None);
    }
}
