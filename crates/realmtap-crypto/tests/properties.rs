//! RC4 セッションとアライメント探索のプロパティテスト
//!
//! - 暗号化 → 復号で元に戻る
//! - `skip(n)` は n バイトのキーストリームを捨てるのと同じ
//! - `fork()` したセッションは元のセッションに影響しない
//! - delta 探索は合成したオフセット k をそのまま返す

use proptest::prelude::*;
use realmtap_crypto::{Aligner, CipherSession, INCOMING_KEY, OUTGOING_KEY};

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=32)
}

#[test]
fn prop_decrypt_inverts_encrypt() {
    proptest!(|(key in key_strategy(), data in prop::collection::vec(any::<u8>(), 0..512), skip in 0usize..2_000)| {
        let mut enc = CipherSession::new(&key).unwrap();
        let mut dec = enc.fork();
        enc.skip(skip);
        dec.skip(skip);

        let mut buf = data.clone();
        enc.apply_keystream(&mut buf);
        dec.apply_keystream(&mut buf);

        prop_assert_eq!(buf, data);
    });
}

#[test]
fn prop_skip_equals_discarding_keystream() {
    proptest!(|(key in key_strategy(), n in 0usize..5_000)| {
        let mut skipped = CipherSession::new(&key).unwrap();
        let mut stepped = skipped.fork();

        skipped.skip(n);
        for _ in 0..n {
            stepped.next_keystream_byte();
        }

        prop_assert_eq!(&skipped, &stepped);
        prop_assert_eq!(skipped.next_keystream_byte(), stepped.next_keystream_byte());
    });
}

#[test]
fn prop_fork_is_independent() {
    proptest!(|(key in key_strategy(), advance in 1usize..1_000)| {
        let original = CipherSession::new(&key).unwrap();
        let snapshot = original.clone();

        let mut fork = original.fork();
        fork.skip(advance);
        fork.reset();
        fork.skip(advance / 2);

        prop_assert_eq!(&original, &snapshot);
    });
}

#[test]
fn prop_delta_search_recovers_offset() {
    let config = ProptestConfig::with_cases(16);
    proptest!(config, |(k in 0usize..20_000, tick in any::<i32>(), gap in 4usize..400, outgoing in any::<bool>())| {
        let key = if outgoing { OUTGOING_KEY } else { INCOMING_KEY };

        let mut sender = CipherSession::from_hex_key(key).unwrap();
        sender.skip(k);
        let mut a = tick.to_be_bytes();
        sender.apply_keystream(&mut a);
        sender.skip(gap - 4);
        let mut b = tick.wrapping_add(1).to_be_bytes();
        sender.apply_keystream(&mut b);

        let mut cipher = CipherSession::from_hex_key(key).unwrap();
        let offset = Aligner::new(20_000).sync_by_delta(&mut cipher, &a, &b, gap).unwrap();

        prop_assert_eq!(offset, k);
    });
}
