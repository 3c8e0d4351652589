//! キャプチャ元の抽象
//!
//! 実際のパケットキャプチャ（デバイス列挙・プロミスキャスモード・OS ごとのドライバ）は
//! このクレートの外にある。ここでは到着順に生フレームを返す `FrameSource` だけを要求する。

use std::collections::VecDeque;
use std::io;

use realmtap_transport::RawFrame;

/// `FrameSource::next_frame` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    /// 1 フレーム届いた
    Frame(RawFrame),
    /// 読み取りタイムアウト。停止フラグを確認してから再度呼ばれる
    Idle,
    /// これ以上フレームは来ない
    Closed,
}

/// 生フレームの供給元（ネットワークインターフェース 1 つ分）
///
/// 各供給元は専用のキャプチャスレッドで読まれる。
/// `next_frame()` は長くブロックせず、フレームが無ければ `Idle` を返すこと。
pub trait FrameSource: Send {
    /// ログに出す名前（インターフェース名など）
    fn name(&self) -> &str;

    /// # エラー
    /// 読み取りに失敗した。このキャプチャスレッドは終了する
    fn next_frame(&mut self) -> io::Result<Capture>;

    /// キャプチャハンドルを閉じる
    fn close(&mut self) {}
}

/// 記録済みのフレームを順に返す供給元
#[derive(Debug, Clone)]
pub struct ReplaySource {
    name: String,
    frames: VecDeque<RawFrame>,
}

impl ReplaySource {
    pub fn new(name: impl Into<String>, frames: impl IntoIterator<Item = RawFrame>) -> Self {
        ReplaySource {
            name: name.into(),
            frames: frames.into_iter().collect(),
        }
    }

    /// 残りのフレーム数
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> io::Result<Capture> {
        Ok(match self.frames.pop_front() {
            Some(frame) => Capture::Frame(frame),
            None => Capture::Closed,
        })
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_in_order_then_closed() {
        let mut source = ReplaySource::new(
            "replay",
            vec![RawFrame::new(vec![1], 1), RawFrame::new(vec![2], 2)],
        );
        assert_eq!(source.name(), "replay");
        assert_eq!(source.next_frame().unwrap(), Capture::Frame(RawFrame::new(vec![1], 1)));
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.next_frame().unwrap(), Capture::Frame(RawFrame::new(vec![2], 2)));
        assert_eq!(source.next_frame().unwrap(), Capture::Closed);
    }

    #[test]
    fn test_close_drops_remaining() {
        let mut source = ReplaySource::new("replay", vec![RawFrame::new(vec![1], 1)]);
        source.close();
        assert_eq!(source.next_frame().unwrap(), Capture::Closed);
    }
}
