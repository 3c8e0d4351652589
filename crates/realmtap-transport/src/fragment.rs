//! IPv4 フラグメントの再組み立て
//!
//! 同じデータグラム（送信元・宛先・プロトコル・identification が一致）の
//! フラグメントを集め、ペイロード範囲が隙間も重なりもなく埋まった時点で 1 つの
//! パケットに戻す。
//!
//! 揃わないフラグメントは保持し続けるが、保持するデータグラム数には上限があり、
//! 超えたら最も古いものから捨てる。

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::packet::Ipv4Packet;

/// 既定の保持データグラム数
pub const DEFAULT_FRAGMENT_CAPACITY: usize = 64;

/// データグラムの識別キー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatagramKey {
    pub src: [u8; 4],
    pub dst: [u8; 4],
    pub protocol: u8,
    pub identification: u16,
}

impl DatagramKey {
    fn of(packet: &Ipv4Packet) -> Self {
        DatagramKey {
            src: packet.src,
            dst: packet.dst,
            protocol: packet.protocol,
            identification: packet.identification,
        }
    }
}

/// フラグメント再組み立て器
///
/// `defragment()` にすべての IPv4 パケットを通す。
/// フラグメントでなければそのまま返り、フラグメントなら揃った時点で完成品が返る。
#[derive(Debug)]
pub struct Defragmenter {
    /// 組み立て中（キー → フラグメントオフセット → フラグメント）
    pending: HashMap<DatagramKey, BTreeMap<u16, Ipv4Packet>>,
    /// 最初に見た順（追い出し用）
    order: VecDeque<DatagramKey>,
    capacity: usize,
    evicted: u64,
}

impl Defragmenter {
    /// 保持上限を指定して生成する（0 は 1 として扱う）
    pub fn new(capacity: usize) -> Self {
        Defragmenter {
            pending: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// パケットを 1 つ受け取る
    ///
    /// # 戻り値
    /// - `Some(packet)`: フラグメントでないパケット、または再組み立てが完了したパケット
    /// - `None`: まだフラグメントが足りない（または組み立て結果が不正だった）
    pub fn defragment(&mut self, packet: Ipv4Packet) -> Option<Ipv4Packet> {
        if packet.dont_fragment || !packet.is_fragment() {
            return Some(packet);
        }

        let key = DatagramKey::of(&packet);
        if !self.pending.contains_key(&key) {
            self.make_room();
            self.order.push_back(key);
        }

        // 同じオフセットの重複は後着で置き換える
        let set = self.pending.entry(key).or_default();
        set.insert(packet.fragment_offset, packet);

        if !is_complete(set) {
            return None;
        }

        let set = self.remove(&key)?;
        let assembled = assemble(&set);
        if assembled.is_none() {
            tracing::debug!(id = key.identification, "reassembled datagram is malformed, dropped");
        }
        assembled
    }

    /// 組み立て中のデータグラム数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 上限超過で捨てたデータグラム数
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// すべて破棄する
    pub fn clear(&mut self) {
        self.pending.clear();
        self.order.clear();
    }

    // ===== Private メソッド =====

    fn make_room(&mut self) {
        while self.pending.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(set) = self.pending.remove(&oldest) {
                self.evicted += 1;
                tracing::debug!(
                    id = oldest.identification,
                    fragments = set.len(),
                    "evicting incomplete fragment set"
                );
            }
        }
    }

    fn remove(&mut self, key: &DatagramKey) -> Option<BTreeMap<u16, Ipv4Packet>> {
        self.order.retain(|k| k != key);
        self.pending.remove(key)
    }
}

impl Default for Defragmenter {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_CAPACITY)
    }
}

/// 先頭（オフセット 0）から末尾（MF なし）まで隙間も重なりもなく並んでいるか
fn is_complete(set: &BTreeMap<u16, Ipv4Packet>) -> bool {
    let mut expected = 0usize;
    let mut iter = set.values().peekable();

    while let Some(frag) = iter.next() {
        if frag.fragment_offset as usize * 8 != expected {
            return false;
        }
        expected += frag.payload().len();

        if !frag.more_fragments {
            // 末尾より後ろにフラグメントがあってはならない
            return iter.peek().is_none();
        }
    }
    false
}

/// 先頭フラグメントのヘッダーに各ペイロードをオフセット位置へ書き込む
fn assemble(set: &BTreeMap<u16, Ipv4Packet>) -> Option<Ipv4Packet> {
    let head = set.get(&0)?;
    let tail = set.values().next_back()?;
    let header_len = head.header_len();
    let total = header_len + tail.fragment_offset as usize * 8 + tail.payload().len();
    if total > u16::MAX as usize {
        return None;
    }

    let mut bytes = vec![0u8; total];
    bytes[..header_len].copy_from_slice(head.header());
    for frag in set.values() {
        let start = header_len + frag.fragment_offset as usize * 8;
        bytes[start..start + frag.payload().len()].copy_from_slice(frag.payload());
    }

    // total length を書き換え、MF とオフセットを消す（DF はそのまま）
    bytes[2..4].copy_from_slice(&(total as u16).to_be_bytes());
    bytes[6] &= 0x40;
    bytes[7] = 0;
    bytes[10..12].copy_from_slice(&[0, 0]);
    let checksum = crate::packet::header_checksum(&bytes[..header_len]);
    bytes[10..12].copy_from_slice(&checksum.to_be_bytes());

    Ipv4Packet::parse(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{TcpFlags, TcpSegment};

    fn datagram(id: u16, payload_len: usize) -> Ipv4Packet {
        datagram_from([52, 0, 0, 1], id, payload_len)
    }

    fn datagram_from(src: [u8; 4], id: u16, payload_len: usize) -> Ipv4Packet {
        TcpSegment {
            src_addr: src,
            dst_addr: [10, 0, 0, 2],
            ip_id: id,
            src_port: 2050,
            dst_port: 40_000,
            sequence: 1,
            acknowledgment: 1,
            flags: TcpFlags(TcpFlags::ACK),
            payload: (0..payload_len).map(|i| i as u8).collect(),
        }
        .to_ipv4()
    }

    #[test]
    fn test_unfragmented_passes_through() {
        let mut defrag = Defragmenter::default();
        let packet = datagram(1, 10);
        assert_eq!(defrag.defragment(packet.clone()), Some(packet));
        assert_eq!(defrag.pending_len(), 0);
    }

    #[test]
    fn test_in_order_reassembly() {
        let mut defrag = Defragmenter::default();
        let original = datagram(2, 100);
        let frags = original.fragment(40);
        assert_eq!(frags.len(), 3);

        assert_eq!(defrag.defragment(frags[0].clone()), None);
        assert_eq!(defrag.defragment(frags[1].clone()), None);
        let assembled = defrag.defragment(frags[2].clone()).unwrap();

        assert_eq!(assembled, original);
        assert_eq!(defrag.pending_len(), 0);
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let mut defrag = Defragmenter::default();
        let original = datagram(3, 64);
        let mut frags = original.fragment(16);
        frags.reverse();

        let mut result = None;
        for frag in frags {
            result = defrag.defragment(frag);
        }
        let assembled = result.unwrap();
        assert_eq!(assembled.tcp().unwrap().payload, original.tcp().unwrap().payload);
    }

    #[test]
    fn test_gap_is_retained() {
        let mut defrag = Defragmenter::default();
        let frags = datagram(4, 64).fragment(16);

        // 2 番目が欠けている
        for (i, frag) in frags.iter().enumerate() {
            if i != 1 {
                assert_eq!(defrag.defragment(frag.clone()), None);
            }
        }
        assert_eq!(defrag.pending_len(), 1);

        // 遅れて届けば完成する
        assert!(defrag.defragment(frags[1].clone()).is_some());
    }

    #[test]
    fn test_duplicate_fragment_replaces() {
        let mut defrag = Defragmenter::default();
        let original = datagram(5, 30);
        let frags = original.fragment(32);
        assert_eq!(frags.len(), 2);

        assert_eq!(defrag.defragment(frags[0].clone()), None);
        assert_eq!(defrag.defragment(frags[0].clone()), None);
        assert_eq!(defrag.defragment(frags[1].clone()), Some(original));
    }

    #[test]
    fn test_oldest_set_evicted_at_capacity() {
        let mut defrag = Defragmenter::new(2);
        let a = datagram(10, 40).fragment(16);
        let b = datagram(11, 40).fragment(16);
        let c = datagram(12, 40).fragment(16);

        defrag.defragment(a[0].clone());
        defrag.defragment(b[0].clone());
        defrag.defragment(c[0].clone());
        assert_eq!(defrag.pending_len(), 2);
        assert_eq!(defrag.evicted(), 1);

        // a は追い出されたので残りを送っても完成しない
        for frag in &a[1..] {
            assert_eq!(defrag.defragment(frag.clone()), None);
        }
        // c は完成する
        let mut done = None;
        for frag in &c[1..] {
            done = defrag.defragment(frag.clone());
        }
        assert!(done.is_some());
    }

    #[test]
    fn test_different_sources_do_not_mix() {
        let mut defrag = Defragmenter::default();
        let first = datagram(20, 40).fragment(16);
        let second = datagram_from([9, 9, 9, 9], 20, 40).fragment(16);

        defrag.defragment(first[0].clone());
        defrag.defragment(second[1].clone());
        defrag.defragment(second[2].clone());
        assert_eq!(defrag.pending_len(), 2);
    }
}
