//! リンク層 / IPv4 / TCP のパース
//!
//! キャプチャしたフレームから TCP ペイロードまでを取り出す。
//! チェックサムは検証しない（受動観測なので壊れたパケットも相手側で再送される）。
//!
//! ## 取り出す範囲
//! ```text
//! Ethernet II [dst: 6][src: 6][(802.1Q tag: 4)][ether_type: 2][payload]
//! IPv4        [ver/ihl][tos][total_len: 2][id: 2][flags/frag_off: 2][ttl][proto][csum: 2][src: 4][dst: 4][options][payload]
//! TCP         [src_port: 2][dst_port: 2][seq: 4][ack: 4][data_off/flags: 2][window: 2][csum: 2][urg: 2][options][payload]
//! ```

use crate::error::TransportError;

/// EtherType: IPv4
pub const ETHER_TYPE_IPV4: u16 = 0x0800;
/// EtherType: 802.1Q VLAN タグ
pub const ETHER_TYPE_VLAN: u16 = 0x8100;
/// IP プロトコル番号: TCP
pub const PROTOCOL_TCP: u8 = 6;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;

/// キャプチャ元から届いた生のリンク層フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Ethernet ヘッダーから始まるバイト列
    pub data: Vec<u8>,
    /// 到着時刻（UNIX エポックからのマイクロ秒）
    pub timestamp_us: u64,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, timestamp_us: u64) -> Self {
        RawFrame { data, timestamp_us }
    }
}

/// Ethernet II フレーム（ペイロードは借用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub ether_type: u16,
    /// 802.1Q タグの TCI（あれば）
    pub vlan_tci: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    /// # エラー
    /// - `TransportError::TooShort`: ヘッダーに満たない
    pub fn parse(data: &'a [u8]) -> Result<Self, TransportError> {
        ensure_len("ethernet", data, ETHERNET_HEADER_LEN)?;

        let outer_type = be16(data, 12);
        if outer_type == ETHER_TYPE_VLAN {
            ensure_len("ethernet", data, ETHERNET_HEADER_LEN + VLAN_TAG_LEN)?;
            return Ok(EthernetFrame {
                ether_type: be16(data, 16),
                vlan_tci: Some(be16(data, 14)),
                payload: &data[ETHERNET_HEADER_LEN + VLAN_TAG_LEN..],
            });
        }

        Ok(EthernetFrame {
            ether_type: outer_type,
            vlan_tci: None,
            payload: &data[ETHERNET_HEADER_LEN..],
        })
    }

    /// IPv4 パケットとして解釈する
    ///
    /// # エラー
    /// - `TransportError::UnsupportedEtherType`: IPv4 以外
    /// - その他 `Ipv4Packet::parse` のエラー
    pub fn ipv4(&self) -> Result<Ipv4Packet, TransportError> {
        if self.ether_type != ETHER_TYPE_IPV4 {
            return Err(TransportError::UnsupportedEtherType(self.ether_type));
        }
        Ipv4Packet::parse(self.payload)
    }

    /// IPv4 パケットを Ethernet II で包む（MAC アドレスはゼロ）
    pub fn wrap_ipv4(ip: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + ip.len());
        frame.extend_from_slice(&[0u8; 12]);
        frame.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());
        frame.extend_from_slice(ip);
        frame
    }
}

/// IPv4 パケット
///
/// `header` はオプションを含むヘッダー全体、`payload` は total length で切り詰めた本体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    pub identification: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// フラグメントオフセット（8 バイト単位）
    pub fragment_offset: u16,
    pub protocol: u8,
    pub src: [u8; 4],
    pub dst: [u8; 4],
    header: Vec<u8>,
    payload: Vec<u8>,
}

impl Ipv4Packet {
    /// # エラー
    /// - `TransportError::NotIpv4`: バージョンが 4 ではない
    /// - `TransportError::TooShort`: ヘッダーまたは total length 分に満たない
    pub fn parse(data: &[u8]) -> Result<Self, TransportError> {
        ensure_len("ipv4", data, IPV4_MIN_HEADER_LEN)?;

        let version = data[0] >> 4;
        if version != 4 {
            return Err(TransportError::NotIpv4 { version });
        }

        let header_len = ((data[0] & 0x0F) as usize) * 4;
        let total_len = be16(data, 2) as usize;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(TransportError::TooShort {
                layer: "ipv4",
                needed: IPV4_MIN_HEADER_LEN,
                actual: header_len,
            });
        }
        ensure_len("ipv4", data, header_len)?;
        if total_len < header_len {
            return Err(TransportError::TooShort {
                layer: "ipv4",
                needed: header_len,
                actual: total_len,
            });
        }
        // Ethernet の最小長パディングは total length で落とす
        ensure_len("ipv4", data, total_len)?;

        let flags_offset = be16(data, 6);
        Ok(Ipv4Packet {
            identification: be16(data, 4),
            dont_fragment: flags_offset & 0x4000 != 0,
            more_fragments: flags_offset & 0x2000 != 0,
            fragment_offset: flags_offset & 0x1FFF,
            protocol: data[9],
            src: [data[12], data[13], data[14], data[15]],
            dst: [data[16], data[17], data[18], data[19]],
            header: data[..header_len].to_vec(),
            payload: data[header_len..total_len].to_vec(),
        })
    }

    /// 最小ヘッダー（オプションなし）でパケットを組み立てる
    pub fn build(identification: u16, protocol: u8, src: [u8; 4], dst: [u8; 4], payload: Vec<u8>) -> Self {
        let mut header = vec![0u8; IPV4_MIN_HEADER_LEN];
        header[0] = 0x45;
        header[4..6].copy_from_slice(&identification.to_be_bytes());
        header[8] = 64;
        header[9] = protocol;
        header[12..16].copy_from_slice(&src);
        header[16..20].copy_from_slice(&dst);

        let mut packet = Ipv4Packet {
            identification,
            dont_fragment: false,
            more_fragments: false,
            fragment_offset: 0,
            protocol,
            src,
            dst,
            header,
            payload,
        };
        packet.sync_header();
        packet
    }

    /// フラグメントの一部か（MF が立っているかオフセットが非ゼロ）
    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset != 0
    }

    pub fn header_len(&self) -> usize {
        self.header.len()
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// ヘッダーを含む全体の長さ
    pub fn total_len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// Wire Format に変換する
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// ペイロードを `chunk` バイトごとのフラグメントに分割する
    ///
    /// `chunk` は 8 の倍数に切り下げる（最低 8）。分割不要なら自分 1 つを返す。
    pub fn fragment(&self, chunk: usize) -> Vec<Ipv4Packet> {
        let chunk = (chunk / 8).max(1) * 8;
        if self.payload.len() <= chunk {
            return vec![self.clone()];
        }

        let base_offset = self.fragment_offset as usize * 8;
        let count = self.payload.len().div_ceil(chunk);
        self.payload
            .chunks(chunk)
            .enumerate()
            .map(|(i, part)| {
                let mut frag = Ipv4Packet {
                    more_fragments: i + 1 < count || self.more_fragments,
                    fragment_offset: ((base_offset + i * chunk) / 8) as u16,
                    payload: part.to_vec(),
                    ..self.clone()
                };
                frag.sync_header();
                frag
            })
            .collect()
    }

    /// TCP セグメントとして解釈する
    ///
    /// # エラー
    /// - `TransportError::NotTcp`: TCP 以外
    /// - `TransportError::TooShort`: TCP ヘッダーに満たない
    pub fn tcp(&self) -> Result<TcpSegment, TransportError> {
        if self.protocol != PROTOCOL_TCP {
            return Err(TransportError::NotTcp {
                protocol: self.protocol,
            });
        }

        let data = &self.payload;
        ensure_len("tcp", data, TCP_MIN_HEADER_LEN)?;
        let data_offset = ((data[12] >> 4) as usize) * 4;
        ensure_len("tcp", data, data_offset.max(TCP_MIN_HEADER_LEN))?;

        Ok(TcpSegment {
            src_addr: self.src,
            dst_addr: self.dst,
            ip_id: self.identification,
            src_port: be16(data, 0),
            dst_port: be16(data, 2),
            sequence: be32(data, 4),
            acknowledgment: be32(data, 8),
            flags: TcpFlags(data[13]),
            payload: data[data_offset.max(TCP_MIN_HEADER_LEN)..].to_vec(),
        })
    }

    // ===== Private メソッド =====

    /// フィールドの値を `header` に書き戻し、チェックサムを再計算する
    fn sync_header(&mut self) {
        let total = self.total_len().min(u16::MAX as usize) as u16;
        self.header[2..4].copy_from_slice(&total.to_be_bytes());
        self.header[4..6].copy_from_slice(&self.identification.to_be_bytes());

        let mut flags_offset = self.fragment_offset & 0x1FFF;
        if self.dont_fragment {
            flags_offset |= 0x4000;
        }
        if self.more_fragments {
            flags_offset |= 0x2000;
        }
        self.header[6..8].copy_from_slice(&flags_offset.to_be_bytes());

        self.header[10..12].copy_from_slice(&[0, 0]);
        let checksum = header_checksum(&self.header);
        self.header[10..12].copy_from_slice(&checksum.to_be_bytes());
    }
}

/// TCP フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(pub u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;

    pub fn fin(&self) -> bool {
        self.0 & Self::FIN != 0
    }

    pub fn syn(&self) -> bool {
        self.0 & Self::SYN != 0
    }

    pub fn rst(&self) -> bool {
        self.0 & Self::RST != 0
    }
}

/// TCP セグメント（IPv4 ヘッダーの必要な情報も持つ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
    /// IPv4 identification（欠落の推定に使う）
    pub ip_id: u16,
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub acknowledgment: u32,
    pub flags: TcpFlags,
    pub payload: Vec<u8>,
}

impl TcpSegment {
    /// IPv4 パケットに包む（TCP チェックサムは 0）
    pub fn to_ipv4(&self) -> Ipv4Packet {
        let mut tcp = Vec::with_capacity(TCP_MIN_HEADER_LEN + self.payload.len());
        tcp.extend_from_slice(&self.src_port.to_be_bytes());
        tcp.extend_from_slice(&self.dst_port.to_be_bytes());
        tcp.extend_from_slice(&self.sequence.to_be_bytes());
        tcp.extend_from_slice(&self.acknowledgment.to_be_bytes());
        tcp.push((TCP_MIN_HEADER_LEN as u8 / 4) << 4);
        tcp.push(self.flags.0);
        tcp.extend_from_slice(&u16::MAX.to_be_bytes()); // window
        tcp.extend_from_slice(&[0, 0, 0, 0]); // checksum, urgent pointer
        tcp.extend_from_slice(&self.payload);

        Ipv4Packet::build(self.ip_id, PROTOCOL_TCP, self.src_addr, self.dst_addr, tcp)
    }

    /// Ethernet フレームまで包んだバイト列
    pub fn to_ethernet(&self) -> Vec<u8> {
        EthernetFrame::wrap_ipv4(&self.to_ipv4().to_bytes())
    }
}

/// リンク層フレームから TCP セグメントまで一気に取り出す
///
/// フラグメントの再組み立ては行わない（フラグメントは `Ipv4Packet` の段階で止める）。
pub fn parse_ipv4(frame: &[u8]) -> Result<Ipv4Packet, TransportError> {
    EthernetFrame::parse(frame)?.ipv4()
}

/// IPv4 ヘッダーチェックサム（1 の補数和）
pub fn header_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|pair| {
            let hi = pair[0] as u32;
            let lo = pair.get(1).copied().unwrap_or(0) as u32;
            (hi << 8) | lo
        })
        .sum();
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

fn ensure_len(layer: &'static str, data: &[u8], needed: usize) -> Result<(), TransportError> {
    if data.len() < needed {
        return Err(TransportError::TooShort {
            layer,
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

fn be16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn be32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
