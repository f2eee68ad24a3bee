//! Reference [`CrdtMerger`] implementation backed by `yrs` (the Rust port
//! of Yjs), grounding the teacher's otherwise-unexercised `yrs` dependency
//! (declared in the teacher's Cargo.toml but never actually called).
//!
//! A property value tagged with kind `"yjs"` carries a lib0-v1-encoded Yjs
//! update. Merging two updates means loading both into a scratch `Doc` and
//! re-encoding its full state — Yjs updates are commutative and
//! idempotent by the CRDT's own contract (spec.md §9), so this is safe to
//! call in any order.

use crate::crdt::CrdtMerger;
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, Transact, Update};

pub const YJS_KIND: &str = "yjs";

pub struct YrsMerger;

impl CrdtMerger for YrsMerger {
    fn kind(&self) -> &str {
        YJS_KIND
    }

    fn merge(&self, current: &[u8], incoming: &[u8]) -> Vec<u8> {
        let doc = Doc::new();
        {
            let mut txn = doc.transact_mut();
            if let Ok(update) = Update::decode_v1(current) {
                txn.apply_update(update);
            }
            if let Ok(update) = Update::decode_v1(incoming) {
                txn.apply_update(update);
            }
        }
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&Default::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yrs::{GetString, Text};

    #[test]
    fn merges_two_text_updates_into_combined_state() {
        // update_b is a continuation of update_a's state (as two peers
        // would actually exchange incremental updates for the same doc),
        // so merging them reconstructs the full edit history.
        let doc_a = Doc::new();
        let text_a = doc_a.get_or_insert_text("t");
        let update_a = {
            let mut txn = doc_a.transact_mut();
            text_a.insert(&mut txn, 0, "hello");
            txn.encode_update_v1()
        };

        let doc_b = Doc::new();
        let text_b = doc_b.get_or_insert_text("t");
        let update_b = {
            let mut txn = doc_b.transact_mut();
            let update = Update::decode_v1(&update_a).unwrap();
            txn.apply_update(update);
            text_b.insert(&mut txn, 5, " world");
            txn.encode_update_v1()
        };

        let merger = YrsMerger;
        let merged = merger.merge(&update_a, &update_b);

        let check = Doc::new();
        let text = check.get_or_insert_text("t");
        {
            let mut txn = check.transact_mut();
            let update = Update::decode_v1(&merged).unwrap();
            txn.apply_update(update);
        }
        let txn = check.transact();
        assert_eq!(text.get_string(&txn), "hello world");
    }
}
