//! バイトストリーム → フレーム

use realmtap_proto::Frame;

/// 既定のパス MTU（TCP ペイロードの最大長）
pub const DEFAULT_MTU: usize = 1460;

/// 長さプレフィックス付きフレームの切り出し器
///
/// 1 方向につき 1 つ持つ。チャンク境界はフレーム境界と無関係でよい。
#[derive(Debug)]
pub struct FrameExtractor {
    /// 組み立て中のフレーム（長さフィールドを含む）
    buf: Vec<u8>,
    /// 長さフィールドで宣言されたフレーム長（0 = 未読）
    declared_len: usize,
    /// MTU 未満のチャンクを待っている間は true
    awaiting_short_chunk: bool,
    mtu: usize,
    max_frame_len: usize,
    oversize_count: u64,
}

impl FrameExtractor {
    /// 途中参加を前提に生成する（MTU 未満のチャンクを見るまで読み捨てる）
    ///
    /// # 引数
    /// - `mtu`: これ未満のチャンクを「バーストの終わり」とみなす
    /// - `max_frame_len`: これを超える長さ宣言は異常値として捨てる
    pub fn new(mtu: usize, max_frame_len: usize) -> Self {
        FrameExtractor {
            buf: Vec::new(),
            declared_len: 0,
            awaiting_short_chunk: true,
            mtu,
            max_frame_len,
            oversize_count: 0,
        }
    }

    /// フレーム境界から始まることが分かっているストリーム用（読み捨てなし）
    pub fn aligned(max_frame_len: usize) -> Self {
        FrameExtractor {
            awaiting_short_chunk: false,
            ..Self::new(DEFAULT_MTU, max_frame_len)
        }
    }

    /// チャンクを受け取り、完成したフレームを返す
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.awaiting_short_chunk {
            // このチャンク自体もバーストの途中から始まっている可能性があるので捨てる
            if chunk.len() < self.mtu {
                self.awaiting_short_chunk = false;
                tracing::debug!(len = chunk.len(), "frame boundary assumed after short chunk");
            }
            return Vec::new();
        }

        let mut frames = Vec::new();
        for &byte in chunk {
            self.buf.push(byte);

            if self.declared_len == 0 && self.buf.len() >= Frame::LENGTH_LEN {
                let declared = Frame::declared_len(&[self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
                if declared > self.max_frame_len || declared < Frame::HEADER_LEN {
                    self.oversize_count += 1;
                    tracing::warn!(
                        declared,
                        max = self.max_frame_len,
                        "invalid frame length, discarding buffered bytes"
                    );
                    self.resync();
                    return frames;
                }
                self.declared_len = declared;
            }

            if self.declared_len != 0 && self.buf.len() == self.declared_len {
                let tag = self.buf[Frame::LENGTH_LEN];
                let payload = self.buf[Frame::HEADER_LEN..].to_vec();
                self.buf.clear();
                self.declared_len = 0;
                tracing::trace!(tag, len = payload.len() + Frame::HEADER_LEN, "frame extracted");
                frames.push(Frame::new(tag, payload));
            }
        }
        frames
    }

    /// 組み立て中のバイトを捨て、境界待ちに戻す
    ///
    /// 新しい接続の開始時は `reset_aligned()` を使う。
    pub fn resync(&mut self) {
        self.clear();
        self.awaiting_short_chunk = true;
    }

    /// 組み立て中のバイトを捨て、次のバイトをフレーム先頭とみなす
    pub fn reset_aligned(&mut self) {
        self.clear();
        self.awaiting_short_chunk = false;
    }

    /// 境界待ち（読み捨て中）か
    pub fn is_awaiting_boundary(&self) -> bool {
        self.awaiting_short_chunk
    }

    /// 組み立て中のバイト数
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// 異常な長さ宣言で捨てた回数
    pub fn oversize_count(&self) -> u64 {
        self.oversize_count
    }

    // ===== Private メソッド =====

    fn clear(&mut self) {
        self.buf.clear();
        self.declared_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(tag: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(tag, payload.to_vec()).to_bytes()
    }

    #[test]
    fn test_single_frame_in_one_chunk() {
        let mut ex = FrameExtractor::aligned(Frame::MAX_FRAME_LEN);
        let frames = ex.push(&frame_bytes(10, &[1, 2, 3]));
        assert_eq!(frames, vec![Frame::new(10, vec![1, 2, 3])]);
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut ex = FrameExtractor::aligned(Frame::MAX_FRAME_LEN);
        let bytes = frame_bytes(62, &[9; 20]);

        assert!(ex.push(&bytes[..2]).is_empty());
        assert!(ex.push(&bytes[2..7]).is_empty());
        let frames = ex.push(&bytes[7..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![9; 20]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut ex = FrameExtractor::aligned(Frame::MAX_FRAME_LEN);
        let mut chunk = frame_bytes(1, &[1]);
        chunk.extend(frame_bytes(2, &[]));
        chunk.extend(frame_bytes(3, &[3, 3]));
        chunk.extend(&frame_bytes(4, &[4])[..3]);

        let tags: Vec<u8> = ex.push(&chunk).iter().map(|f| f.tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(ex.buffered(), 3);
    }

    #[test]
    fn test_startup_guard_discards_until_short_chunk() {
        let mut ex = FrameExtractor::new(8, Frame::MAX_FRAME_LEN);
        assert!(ex.is_awaiting_boundary());

        // MTU ちょうどのチャンクは途中の可能性がある
        assert!(ex.push(&[0xFF; 8]).is_empty());
        assert!(ex.is_awaiting_boundary());

        // 短いチャンクも捨てるが、境界は次から
        assert!(ex.push(&[0xEE; 3]).is_empty());
        assert!(!ex.is_awaiting_boundary());

        assert_eq!(ex.push(&frame_bytes(7, &[])).len(), 1);
    }

    #[test]
    fn test_oversize_length_discards_and_resyncs() {
        let mut ex = FrameExtractor::aligned(100);
        let mut chunk = 1_000u32.to_be_bytes().to_vec();
        chunk.extend(frame_bytes(1, &[1]));

        assert!(ex.push(&chunk).is_empty());
        assert_eq!(ex.oversize_count(), 1);
        assert_eq!(ex.buffered(), 0);
        assert!(ex.is_awaiting_boundary());
    }

    #[test]
    fn test_length_below_header_is_invalid() {
        let mut ex = FrameExtractor::aligned(Frame::MAX_FRAME_LEN);
        assert!(ex.push(&[0, 0, 0, 2, 9, 9]).is_empty());
        assert_eq!(ex.oversize_count(), 1);
    }

    #[test]
    fn test_reset_aligned_drops_partial_frame() {
        let mut ex = FrameExtractor::aligned(Frame::MAX_FRAME_LEN);
        ex.push(&[0, 0, 0, 50, 1]);
        ex.reset_aligned();
        assert_eq!(ex.buffered(), 0);
        assert_eq!(ex.push(&frame_bytes(5, &[0])).len(), 1);
    }
}
