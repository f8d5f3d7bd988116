//! Frame providers: the boundary between the tracking SDK side and the bridge.
//!
//! Frames cross this boundary as plain values; nothing here outlives a single
//! `next_frame` call on the consumer side.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::frame::Frame;
use crate::playback::PlaybackSpeed;

/// 一回の next_frame で待つ上限。これより先のフレームは次の呼び出しに回す
pub const MAX_PACING_SLEEP: Duration = Duration::from_millis(50);

/// Anything that yields tracking frames.
pub trait FrameSource {
    /// Next frame, or `None` when no new frame is available.
    ///
    /// May block until a frame is ready (live input, paced playback).
    fn next_frame(&mut self) -> Result<Option<Frame>, ProviderError>;

    /// True once the source will never yield another frame.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Playback controls, only for recorded sessions.
    fn playback(&mut self) -> Option<&mut dyn PlaybackControl> {
        None
    }
}

/// Seek / speed controls of a recorded session.
pub trait PlaybackControl {
    /// Index of the last delivered frame.
    fn frame_index(&self) -> Option<u64>;
    fn frame_count(&self) -> u64;
    /// The next delivered frame will be `index`.
    fn seek(&mut self, index: u64) -> Result<(), ProviderError>;
    fn set_speed(&mut self, speed: PlaybackSpeed) -> Result<(), ProviderError>;
    fn speed(&self) -> PlaybackSpeed;
    fn is_end_of_stream(&self) -> bool;
}

/// Parse JSON-Lines frames. Blank lines are skipped.
pub fn read_frames<R: BufRead>(reader: R) -> Result<Vec<Frame>, ProviderError> {
    let mut frames = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::from_str(&line)
            .map_err(|source| ProviderError::Parse { line: i + 1, source })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Write frames as JSON Lines.
pub fn write_frames<W: Write>(mut writer: W, frames: &[Frame]) -> Result<(), ProviderError> {
    for frame in frames {
        serde_json::to_writer(&mut writer, frame).map_err(std::io::Error::from)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Plays back a recorded session held in memory.
pub struct RecordingPlayer {
    frames: Vec<Frame>,
    cursor: usize,
    last_index: Option<u64>,
    speed: PlaybackSpeed,
    /// (recording timestamp, wall clock) the current pacing run started at
    anchor: Option<(f64, Instant)>,
}

impl RecordingPlayer {
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            cursor: 0,
            last_index: None,
            speed: PlaybackSpeed::default(),
            anchor: None,
        }
    }

    /// Load a JSON-Lines recording.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let frames = read_frames(BufReader::new(file))?;
        info!("Loaded {} frames from {}", frames.len(), path.display());
        Ok(Self::from_frames(frames))
    }

    /// `timestamp` のフレームを出してよい時刻まで待つ。
    /// MAX_PACING_SLEEP 待ってもまだなら false
    fn wait_for(&mut self, timestamp: f64) -> bool {
        let PlaybackSpeed::Multiplier(multiplier) = self.speed else {
            return true;
        };
        let Some((start_ts, start_at)) = self.anchor.filter(|(ts, _)| timestamp >= *ts) else {
            // 最初のフレーム、または時刻が巻き戻った
            self.anchor = Some((timestamp, Instant::now()));
            return true;
        };

        let offset = (timestamp - start_ts) / multiplier as f64;
        let Some(target) = Duration::try_from_secs_f64(offset)
            .ok()
            .and_then(|d| start_at.checked_add(d))
        else {
            warn!(
                "Timestamp gap of {:.3}s cannot be paced at {}, restarting pacing",
                timestamp - start_ts,
                self.speed
            );
            self.anchor = Some((timestamp, Instant::now()));
            return true;
        };

        let now = Instant::now();
        if target <= now {
            return true;
        }
        let remaining = target - now;
        thread::sleep(remaining.min(MAX_PACING_SLEEP));
        remaining <= MAX_PACING_SLEEP
    }
}

impl FrameSource for RecordingPlayer {
    fn next_frame(&mut self) -> Result<Option<Frame>, ProviderError> {
        let Some(frame) = self.frames.get(self.cursor).cloned() else {
            return Ok(None);
        };
        if !self.wait_for(frame.timestamp) {
            return Ok(None);
        }
        self.last_index = Some(self.cursor as u64);
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn is_exhausted(&self) -> bool {
        self.is_end_of_stream()
    }

    fn playback(&mut self) -> Option<&mut dyn PlaybackControl> {
        Some(self)
    }
}

impl PlaybackControl for RecordingPlayer {
    fn frame_index(&self) -> Option<u64> {
        self.last_index
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn seek(&mut self, index: u64) -> Result<(), ProviderError> {
        if index >= self.frame_count() {
            return Err(ProviderError::SeekOutOfRange {
                index,
                len: self.frame_count(),
            });
        }
        debug!("seek to frame {}", index);
        self.cursor = index as usize;
        self.anchor = None;
        Ok(())
    }

    fn set_speed(&mut self, speed: PlaybackSpeed) -> Result<(), ProviderError> {
        if let PlaybackSpeed::Multiplier(m) = speed {
            if !speed.is_valid() {
                return Err(ProviderError::InvalidSpeed(m));
            }
        }
        self.speed = speed;
        self.anchor = None;
        Ok(())
    }

    fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    fn is_end_of_stream(&self) -> bool {
        self.cursor >= self.frames.len()
    }
}

/// Live frames as JSON Lines from a reader (stdin by default).
pub struct JsonLinesSource<R> {
    reader: R,
    line: usize,
    exhausted: bool,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            exhausted: false,
        }
    }
}

impl JsonLinesSource<std::io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock())
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, ProviderError> {
        if self.exhausted {
            return Ok(None);
        }
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf)? == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            self.line += 1;
            if !buf.trim().is_empty() {
                break;
            }
        }
        let frame = serde_json::from_str(buf.trim()).map_err(|source| ProviderError::Parse {
            line: self.line,
            source,
        })?;
        Ok(Some(frame))
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
