//! Writes a synthetic recorded session (JSON Lines) so the bridge can run
//! without a depth sensor.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::info;

use skeleton_osc_bridge::source::write_frames;
use skeleton_osc_bridge::{Frame, JointSample, JointType, TrackingStatus, UserFrame, UserId};

const CALIBRATION_FRAMES: usize = 15;
const TAIL_FRAMES: usize = 10;

/// 胴体を原点とした関節オフセット（mm）
const SKELETON_OFFSETS: [[f32; 3]; JointType::COUNT] = [
    [0.0, 650.0, 0.0],     // head
    [0.0, 450.0, 0.0],     // neck
    [0.0, 0.0, 0.0],       // torso
    [-180.0, 420.0, 0.0],  // left_shoulder
    [-420.0, 380.0, 0.0],  // left_elbow
    [-640.0, 360.0, 0.0],  // left_hand
    [180.0, 420.0, 0.0],   // right_shoulder
    [420.0, 380.0, 0.0],   // right_elbow
    [640.0, 360.0, 0.0],   // right_hand
    [-120.0, -220.0, 0.0], // left_hip
    [-130.0, -650.0, 0.0], // left_knee
    [-130.0, -1050.0, 0.0], // left_foot
    [120.0, -220.0, 0.0],  // right_hip
    [130.0, -650.0, 0.0],  // right_knee
    [130.0, -1050.0, 0.0], // right_foot
];

/// Generate a synthetic recording for the bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output file, "-" for stdout
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Frames per second of the recording
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Empty frames before anyone appears
    #[arg(long, default_value_t = 90)]
    lead_in: usize,

    /// Tracked frames (split in two halves around the gap)
    #[arg(long, default_value_t = 300)]
    tracked: usize,

    /// Empty frames in the middle of the session
    #[arg(long, default_value_t = 0)]
    gap: usize,

    /// A second user joins during the first half
    #[arg(long)]
    second_user: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let frames = generate(&args);

    if args.output.as_os_str() == "-" {
        write_frames(BufWriter::new(io::stdout().lock()), &frames)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("Failed to create {}", args.output.display()))?;
        write_frames(BufWriter::new(file), &frames)?;
        info!("Wrote {} frames to {}", frames.len(), args.output.display());
    }
    Ok(())
}

fn generate(args: &Args) -> Vec<Frame> {
    let mut timeline: Vec<Vec<UserFrame>> = Vec::new();
    let first_half = args.tracked / 2;
    let second_half = args.tracked - first_half;

    timeline.extend((0..args.lead_in).map(|_| vec![]));
    timeline.extend((0..CALIBRATION_FRAMES).map(|_| vec![UserFrame::new(1, TrackingStatus::Calibrating)]));

    for i in 0..first_half {
        let t = timeline.len() as f64 / args.fps;
        let mut users = vec![tracked_user(1, t, 0.0)];
        if args.second_user {
            let second = if i < CALIBRATION_FRAMES {
                UserFrame::new(2, TrackingStatus::Calibrating)
            } else {
                tracked_user(2, t, 800.0)
            };
            users.push(second);
        }
        timeline.push(users);
    }
    if args.second_user {
        let t = timeline.len() as f64 / args.fps;
        timeline.push(vec![tracked_user(1, t, 0.0), UserFrame::new(2, TrackingStatus::Lost)]);
    }

    timeline.extend((0..args.gap).map(|_| vec![]));

    for _ in 0..second_half {
        let t = timeline.len() as f64 / args.fps;
        timeline.push(vec![tracked_user(1, t, 0.0)]);
    }
    timeline.push(vec![UserFrame::new(1, TrackingStatus::Lost)]);
    timeline.extend((0..TAIL_FRAMES).map(|_| vec![]));

    timeline
        .into_iter()
        .enumerate()
        .map(|(i, users)| Frame::new(i as f64 / args.fps, users))
        .collect()
}

/// ゆっくり左右に歩きながら手を振る
fn tracked_user(id: UserId, t: f64, offset_x: f32) -> UserFrame {
    let sway = (t * 0.5).sin() as f32 * 600.0 + offset_x;
    let wave = (t * 3.0).sin() as f32 * 200.0;
    let joints = JointType::ALL
        .iter()
        .map(|&joint| {
            let [dx, dy, dz] = SKELETON_OFFSETS[joint as usize];
            let lift = match joint {
                JointType::LeftHand | JointType::RightHand => wave,
                _ => 0.0,
            };
            JointSample::new(joint, [sway + dx, 100.0 + dy + lift, 2500.0 + dz], 1.0)
        })
        .collect();
    UserFrame::new(id, TrackingStatus::Tracked).with_joints(joints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from(["simulate-session", "--lead-in", "5", "--tracked", "40", "--gap", "3"])
    }

    #[test]
    fn test_leading_frames_are_empty() {
        let frames = generate(&args());
        assert!(frames[..5].iter().all(|f| f.is_empty()));
        assert!(frames[5].is_qualifying());
    }

    #[test]
    fn test_frame_count() {
        let frames = generate(&args());
        assert_eq!(frames.len(), 5 + CALIBRATION_FRAMES + 40 + 3 + 1 + TAIL_FRAMES);
        let last = &frames[frames.len() - TAIL_FRAMES - 1];
        assert_eq!(last.users[0].status, TrackingStatus::Lost);
    }

    #[test]
    fn test_tracked_users_have_full_skeleton() {
        let frames = generate(&args());
        for user in frames.iter().flat_map(|f| f.tracked_users()) {
            assert_eq!(user.joints.len(), JointType::COUNT);
        }
    }

    #[test]
    fn test_second_user() {
        let args = Args::parse_from(["simulate-session", "--lead-in", "0", "--second-user"]);
        let frames = generate(&args);
        assert!(frames.iter().any(|f| f.users.iter().any(|u| u.id == 2
            && u.status == TrackingStatus::Tracked)));
        assert!(frames.iter().any(|f| f.users.iter().any(|u| u.id == 2
            && u.status == TrackingStatus::Lost)));
    }
}
