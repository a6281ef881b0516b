#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property-based tests for the record block codec.

use loquet_device::{encode_block, GenericField, RecordStore};
use proptest::prelude::*;

fn field_strategy() -> impl Strategy<Value = GenericField> {
    ("[a-z][a-z0-9_]{0,19}", "[ -~]{0,100}")
        .prop_map(|(name, value)| GenericField::new(name, value))
}

proptest! {
    /// Every encodable field list decodes back to itself through the store.
    #[test]
    fn encoded_blocks_decode_losslessly(
        fields in proptest::collection::vec(field_strategy(), 0..12),
    ) {
        let raw = encode_block(&fields).unwrap();
        let mut store = RecordStore::new();
        let record = store.decode_block(1, 1, &raw).unwrap().unwrap();
        prop_assert_eq!(&record.fields, &fields);
    }

    /// The parser never panics on arbitrary bytes — it either decodes or
    /// reports a format error, and the store stays consistent.
    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut store = RecordStore::new();
        match store.decode_block(1, 1, &bytes) {
            Ok(Some(record)) => prop_assert_eq!(record.id, Some(1)),
            Ok(None) => prop_assert!(false, "revision 1 never reports no-entry"),
            Err(_) => prop_assert!(store.is_empty()),
        }
    }
}
