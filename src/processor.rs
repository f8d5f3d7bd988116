//! One `tick()` per input frame: acquire, classify, encode, transmit.

use std::collections::BTreeMap;

use rosc::OscMessage;
use tracing::{debug, trace, warn};

use crate::config::PlaybackConfig;
use crate::error::{BridgeError, EncodeError, ProviderError};
use crate::frame::{Frame, TrackingStatus, UserFrame, UserId};
use crate::osc::{self, PacketBuilder};
use crate::playback::{PlaybackController, PlaybackTransition, Rewind};
use crate::source::FrameSource;
use crate::transport::PacketSink;
use crate::user_state::{StateChange, UserStateTracker};

/// Running totals, read by the driver for periodic logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub frames: u64,
    pub state_changes: u64,
    pub joint_messages: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
}

/// What one processed frame produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Recording index, recorded sessions only
    pub frame_index: Option<u64>,
    pub timestamp: f64,
    pub state_changes: Vec<StateChange>,
    pub joint_messages: usize,
    pub qualifying: bool,
    pub transition: Option<PlaybackTransition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Frame(FrameReport),
    /// Nothing to send this tick (not yet due, or the input ended)
    NoFrame,
    /// A looping recording went back to its start frame
    Rewound(Rewind),
}

pub struct FrameProcessor<S, T> {
    source: S,
    sink: T,
    users: UserStateTracker,
    packets: PacketBuilder,
    playback: Option<PlaybackController>,
    session_started: bool,
    stats: BridgeStats,
}

impl<S: FrameSource, T: PacketSink> FrameProcessor<S, T> {
    /// Fails if the largest message of the schema does not fit into `max_packet_size`.
    pub fn new(source: S, sink: T, max_packet_size: usize) -> Result<Self, EncodeError> {
        Ok(Self {
            source,
            sink,
            users: UserStateTracker::new(),
            packets: PacketBuilder::new(max_packet_size)?,
            playback: None,
            session_started: false,
            stats: BridgeStats::default(),
        })
    }

    /// Attach a playback controller. No-op for sources without playback controls.
    pub fn with_playback(mut self, config: &PlaybackConfig) -> Result<Self, ProviderError> {
        if let Some(control) = self.source.playback() {
            let mut controller = PlaybackController::new(config);
            controller.start(control)?;
            self.playback = Some(controller);
        } else {
            debug!("Source has no playback controls, running live");
        }
        Ok(self)
    }

    pub fn tick(&mut self) -> Result<TickOutcome, BridgeError> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(match self.handle_no_frame()? {
                Some(rewind) => TickOutcome::Rewound(rewind),
                None => TickOutcome::NoFrame,
            });
        };
        let frame_index = self.source.playback().and_then(|c| c.frame_index());
        trace!("frame {:?} at {:.3}", frame_index, frame.timestamp);

        if !self.session_started {
            self.queue(osc::session_begin())?;
            self.session_started = true;
        }
        self.queue(osc::frame_begin(frame.timestamp))?;

        let state_changes = self.users.classify(&frame);
        for change in &state_changes {
            self.queue(osc::user_state(change.user, change.current))?;
        }

        let mut joint_messages = 0;
        for user in latest_records(&frame).into_values() {
            if user.status != TrackingStatus::Tracked {
                continue;
            }
            for sample in user.ordered_joints() {
                self.queue(osc::joint(user.id, &sample))?;
                joint_messages += 1;
            }
        }

        if let Some(packet) = self.packets.flush()? {
            self.transmit(&packet);
        }

        let qualifying = frame.is_qualifying();
        let transition = match (self.playback.as_mut(), self.source.playback(), frame_index) {
            (Some(controller), Some(control), Some(index)) => {
                controller.observe(index, qualifying, control)
            }
            _ => None,
        };

        self.stats.frames += 1;
        self.stats.state_changes += state_changes.len() as u64;
        self.stats.joint_messages += joint_messages as u64;

        Ok(TickOutcome::Frame(FrameReport {
            frame_index,
            timestamp: frame.timestamp,
            state_changes,
            joint_messages,
            qualifying,
            transition,
        }))
    }

    /// The source will not yield more frames.
    pub fn is_finished(&self) -> bool {
        self.source.is_exhausted()
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn users(&self) -> &UserStateTracker {
        &self.users
    }

    pub fn playback(&self) -> Option<&PlaybackController> {
        self.playback.as_ref()
    }

    pub fn sink(&self) -> &T {
        &self.sink
    }

    fn handle_no_frame(&mut self) -> Result<Option<Rewind>, ProviderError> {
        match (self.playback.as_mut(), self.source.playback()) {
            (Some(controller), Some(control)) if control.is_end_of_stream() => {
                controller.on_end_of_stream(control)
            }
            _ => Ok(None),
        }
    }

    fn queue(&mut self, msg: OscMessage) -> Result<(), EncodeError> {
        if let Some(packet) = self.packets.push(msg)? {
            self.transmit(&packet);
        }
        Ok(())
    }

    fn transmit(&mut self, packet: &[u8]) {
        match self.sink.send(packet) {
            Ok(()) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += packet.len() as u64;
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("Dropped packet ({} bytes): {}", packet.len(), e);
            }
        }
    }
}

/// Users by id, ascending; a repeated id keeps its last record.
fn latest_records(frame: &Frame) -> BTreeMap<UserId, &UserFrame> {
    frame.users.iter().map(|u| (u.id, u)).collect()
}
