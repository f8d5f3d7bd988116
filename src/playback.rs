use std::fmt;

use tracing::{info, warn};

use crate::config::PlaybackConfig;
use crate::error::ProviderError;
use crate::source::PlaybackControl;

/// 受け付ける速度倍率の範囲
pub const MIN_SPEED: f32 = 0.01;
pub const MAX_SPEED: f32 = 1000.0;

/// 再生速度
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackSpeed {
    /// 実時間に対する倍率
    Multiplier(f32),
    /// 待たずに可能な限り速く
    Unthrottled,
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self::Multiplier(1.0)
    }
}

impl PlaybackSpeed {
    /// 倍率が範囲内か（Unthrottled は常に有効）
    pub fn is_valid(self) -> bool {
        match self {
            Self::Multiplier(m) => (MIN_SPEED..=MAX_SPEED).contains(&m),
            Self::Unthrottled => true,
        }
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multiplier(m) => write!(f, "{}x", m),
            Self::Unthrottled => write!(f, "unthrottled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Normal,
    Seeking,
    FastForwarding,
}

/// 録画再生中のセッション状態
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub mode: PlaybackMode,
    pub speed: PlaybackSpeed,
    /// 最初にアクティブなユーザーが見つかったフレーム
    pub start_frame_index: Option<u64>,
    pub skip_empty_segments: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTransition {
    pub from: PlaybackMode,
    pub to: PlaybackMode,
    pub frame_index: u64,
}

/// ループ再生で開始フレームに戻った
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewind {
    pub start_frame_index: u64,
    /// Normal 以外から戻ったときの遷移
    pub transition: Option<PlaybackTransition>,
}

/// 録画の再生制御
///
/// - Seeking: 最初のアクティブフレームまで全速で進める（見つかった後は二度と戻らない）
/// - Normal: 通常速度
/// - FastForwarding: 空フレームが続く区間を早送り
///
/// 速度変更はモード遷移のときだけ発行する。
pub struct PlaybackController {
    session: PlaybackSession,
    normal_speed: f32,
    fast_forward_speed: f32,
    loop_playback: bool,
    /// 直前に観測したフレームが空だったか
    previous_empty: bool,
    end_reported: bool,
}

impl PlaybackController {
    pub fn new(config: &PlaybackConfig) -> Self {
        let mode = if config.start_frame.is_some() {
            PlaybackMode::Normal
        } else {
            PlaybackMode::Seeking
        };
        Self {
            session: PlaybackSession {
                mode,
                speed: PlaybackSpeed::default(),
                start_frame_index: config.start_frame,
                skip_empty_segments: config.skip_empty_segments,
            },
            normal_speed: config.speed,
            fast_forward_speed: config.fast_forward_speed,
            loop_playback: config.loop_playback,
            previous_empty: false,
            end_reported: false,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn mode(&self) -> PlaybackMode {
        self.session.mode
    }

    pub fn start_frame_index(&self) -> Option<u64> {
        self.session.start_frame_index
    }

    /// 初期状態を録画側に反映する
    pub fn start(&mut self, control: &mut dyn PlaybackControl) -> Result<(), ProviderError> {
        if let Some(start) = self.session.start_frame_index {
            control.seek(start)?;
            info!("Playback starts at frame {}", start);
        } else {
            info!("Seeking for the first frame with an active user");
        }
        let speed = self.speed_for(self.session.mode);
        control.set_speed(speed)?;
        self.session.speed = speed;
        Ok(())
    }

    /// 処理したフレームがアクティブ（Calibrating / Tracked あり）かを受け取り、モードを更新する
    pub fn observe(
        &mut self,
        frame_index: u64,
        qualifying: bool,
        control: &mut dyn PlaybackControl,
    ) -> Option<PlaybackTransition> {
        let next = match self.session.mode {
            PlaybackMode::Seeking if qualifying => {
                self.session.start_frame_index = Some(frame_index);
                Some(PlaybackMode::Normal)
            }
            PlaybackMode::Normal
                if self.session.skip_empty_segments && !qualifying && self.previous_empty =>
            {
                Some(PlaybackMode::FastForwarding)
            }
            PlaybackMode::FastForwarding if qualifying => Some(PlaybackMode::Normal),
            _ => None,
        };
        self.previous_empty = !qualifying;

        next.map(|to| self.transition(to, frame_index, control))
    }

    /// 録画の終端に達したときの処理。ループ再生で先頭に戻ったら Some
    pub fn on_end_of_stream(
        &mut self,
        control: &mut dyn PlaybackControl,
    ) -> Result<Option<Rewind>, ProviderError> {
        match (self.loop_playback, self.session.start_frame_index) {
            (true, Some(start)) => {
                control.seek(start)?;
                self.previous_empty = false;
                info!("End of recording, looping back to frame {}", start);
                let transition = (self.session.mode != PlaybackMode::Normal)
                    .then(|| self.transition(PlaybackMode::Normal, start, control));
                Ok(Some(Rewind {
                    start_frame_index: start,
                    transition,
                }))
            }
            (_, None) => {
                if !self.end_reported {
                    warn!("End of recording reached without any active user");
                    self.end_reported = true;
                }
                Ok(None)
            }
            (false, Some(_)) => {
                if !self.end_reported {
                    info!("End of recording");
                    self.end_reported = true;
                }
                Ok(None)
            }
        }
    }

    fn speed_for(&self, mode: PlaybackMode) -> PlaybackSpeed {
        match mode {
            PlaybackMode::Seeking => PlaybackSpeed::Unthrottled,
            PlaybackMode::Normal => PlaybackSpeed::Multiplier(self.normal_speed),
            PlaybackMode::FastForwarding => PlaybackSpeed::Multiplier(self.fast_forward_speed),
        }
    }

    fn transition(
        &mut self,
        to: PlaybackMode,
        frame_index: u64,
        control: &mut dyn PlaybackControl,
    ) -> PlaybackTransition {
        let from = self.session.mode;
        self.session.mode = to;

        let speed = self.speed_for(to);
        match control.set_speed(speed) {
            Ok(()) => self.session.speed = speed,
            Err(e) => warn!("Failed to set playback speed {}: {}", speed, e),
        }
        info!(
            "Playback {:?} -> {:?} at frame {} ({})",
            from, to, frame_index, self.session.speed
        );

        PlaybackTransition {
            from,
            to,
            frame_index,
        }
    }
}
