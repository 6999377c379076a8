//! Property-based tests for farflung's frame codec.
//!
//! These use `proptest` to check the two invariants `spec.md` §8 calls out
//! by name — roundtrip and authentication — across a generated value
//! domain, rather than the handful of fixed examples in `codec.rs`'s own
//! unit tests.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test property_tests
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```

use farflung::codec::{decode, encode};
use farflung::message::Message;
use farflung::node_id::NodeId;
use farflung::Configuration;
use proptest::prelude::*;

fn config() -> Configuration {
    Configuration::new("abcdefghijklmnopqrstuvwxyz012345").unwrap()
}

// == Codec Roundtrip ============================================================
// spec.md §8: "For all values v in the supported value domain and for any
// valid key k: decode(encode(v, k), k) = v." Exercised here over `Result`
// messages carrying arbitrary integer vectors and strings, the shape of
// payload a real job's work item or result would take.
// ================================================================================

proptest! {
    /// Verifies `Result(id, payload)` survives encode/decode unchanged for
    /// arbitrary integer-vector payloads.
    ///
    /// **Property**: decode(encode(Result(id, v), k), k) == Result(id, v)
    #[test]
    fn prop_result_message_roundtrips(payload in proptest::collection::vec(any::<i32>(), 0..64)) {
        let cfg = config();
        let id = NodeId::new();
        let msg: Message<(), (), Vec<i32>> = Message::Result(id, payload.clone());

        let bytes = encode(&msg, &cfg).unwrap();
        let back: Message<(), (), Vec<i32>> = decode(&bytes, &cfg).unwrap();

        prop_assert_eq!(back, msg);
    }

    /// Verifies `NewData` survives encode/decode unchanged for both the
    /// sentinel (`None`) and an arbitrary string work item.
    ///
    /// **Property**: decode(encode(NewData(w), k), k) == NewData(w)
    #[test]
    fn prop_new_data_roundtrips(item in proptest::option::of(".*")) {
        let cfg = config();
        let msg: Message<(), String, ()> = Message::NewData(item.clone());

        let bytes = encode(&msg, &cfg).unwrap();
        let back: Message<(), String, ()> = decode(&bytes, &cfg).unwrap();

        prop_assert_eq!(back, msg);
    }

    /// Verifies `InitOk` survives encode/decode unchanged for an arbitrary
    /// init payload made of mixed scalar types.
    ///
    /// **Property**: decode(encode(InitOk(i), k), k) == InitOk(i)
    #[test]
    fn prop_init_ok_roundtrips(n in any::<u32>(), flag in any::<bool>(), text in ".*") {
        let cfg = config();
        let msg: Message<(u32, bool, String), (), ()> =
            Message::InitOk((n, flag, text));

        let bytes = encode(&msg, &cfg).unwrap();
        let back: Message<(u32, bool, String), (), ()> = decode(&bytes, &cfg).unwrap();

        prop_assert_eq!(back, msg);
    }
}

// == Codec Authentication ========================================================
// spec.md §8: "Flipping any bit of encode(v, k) causes decode to raise
// CodecError." A flipped bit anywhere in the token must never silently
// decode to a different value — only ever fail, collapsed to
// `CodecError::DecodeFailed`.
// ================================================================================

proptest! {
    /// Verifies flipping a single bit anywhere in an encoded frame always
    /// breaks decode, never silently produces a different valid value.
    ///
    /// **Property**: for any bit index i < 8*len(encode(v,k)),
    /// decode(flip_bit(encode(v, k), i), k) is Err(CodecError::DecodeFailed)
    #[test]
    fn prop_any_single_bit_flip_breaks_decode(
        payload in proptest::collection::vec(any::<u8>(), 1..32),
        bit_index in 0usize..256,
    ) {
        let cfg = config();
        let msg: Message<(), Vec<u8>, ()> = Message::NewData(Some(payload));

        let mut bytes = encode(&msg, &cfg).unwrap();
        let bit_index = bit_index % (bytes.len() * 8);
        let byte_index = bit_index / 8;
        let bit_in_byte = bit_index % 8;
        bytes[byte_index] ^= 1 << bit_in_byte;

        let result: Result<Message<(), Vec<u8>, ()>, _> = decode(&bytes, &cfg);
        prop_assert!(result.is_err());
    }
}
