use serde::{Deserialize, Serialize};

/// センサーが割り当てるユーザーID
pub type UserId = u16;

/// ユーザーごとのトラッキング状態（センサー側の報告をそのまま使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    None,
    Calibrating,
    Tracked,
    Lost,
}

impl TrackingStatus {
    /// OSCで送る状態名
    pub fn osc_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Calibrating => "calibrating",
            Self::Tracked => "tracking",
            Self::Lost => "lost",
        }
    }

    /// キャリブレーション中またはトラッキング中
    pub fn is_active(self) -> bool {
        matches!(self, Self::Calibrating | Self::Tracked)
    }
}

/// スケルトンの15関節
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum JointType {
    Head = 0,
    Neck = 1,
    Torso = 2,
    LeftShoulder = 3,
    LeftElbow = 4,
    LeftHand = 5,
    RightShoulder = 6,
    RightElbow = 7,
    RightHand = 8,
    LeftHip = 9,
    LeftKnee = 10,
    LeftFoot = 11,
    RightHip = 12,
    RightKnee = 13,
    RightFoot = 14,
}

impl JointType {
    pub const COUNT: usize = 15;

    /// 送信順
    pub const ALL: [JointType; Self::COUNT] = [
        Self::Head,
        Self::Neck,
        Self::Torso,
        Self::LeftShoulder,
        Self::LeftElbow,
        Self::LeftHand,
        Self::RightShoulder,
        Self::RightElbow,
        Self::RightHand,
        Self::LeftHip,
        Self::LeftKnee,
        Self::LeftFoot,
        Self::RightHip,
        Self::RightKnee,
        Self::RightFoot,
    ];

    /// OSCアドレスに使う関節名
    pub fn name(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Neck => "neck",
            Self::Torso => "torso",
            Self::LeftShoulder => "left_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::LeftHand => "left_hand",
            Self::RightShoulder => "right_shoulder",
            Self::RightElbow => "right_elbow",
            Self::RightHand => "right_hand",
            Self::LeftHip => "left_hip",
            Self::LeftKnee => "left_knee",
            Self::LeftFoot => "left_foot",
            Self::RightHip => "right_hip",
            Self::RightKnee => "right_knee",
            Self::RightFoot => "right_foot",
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// 単一関節のサンプル
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub joint: JointType,
    /// 位置 (x, y, z)、センサー座標系
    pub position: [f32; 3],
    /// 信頼度 (0.0〜1.0)
    pub confidence: f32,
}

impl JointSample {
    pub fn new(joint: JointType, position: [f32; 3], confidence: f32) -> Self {
        Self {
            joint,
            position,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// 1フレーム内の1ユーザー分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFrame {
    pub id: UserId,
    pub status: TrackingStatus,
    /// Trackedのときのみ意味を持つ
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joints: Vec<JointSample>,
}

impl UserFrame {
    pub fn new(id: UserId, status: TrackingStatus) -> Self {
        Self {
            id,
            status,
            joints: Vec::new(),
        }
    }

    pub fn with_joints(mut self, joints: Vec<JointSample>) -> Self {
        self.joints = joints;
        self
    }

    /// 関節を送信順に並べて返す（同じ関節が複数あれば最後のもの）
    pub fn ordered_joints(&self) -> Vec<JointSample> {
        let mut slots: [Option<JointSample>; JointType::COUNT] = [None; JointType::COUNT];
        for sample in &self.joints {
            slots[sample.joint as usize] = Some(*sample);
        }
        slots.into_iter().flatten().collect()
    }
}

/// トラッキングプロバイダから受け取る1フレーム
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// タイムスタンプ（秒）
    pub timestamp: f64,
    #[serde(default)]
    pub users: Vec<UserFrame>,
}

impl Frame {
    pub fn new(timestamp: f64, users: Vec<UserFrame>) -> Self {
        Self { timestamp, users }
    }

    /// Calibrating / Tracked のユーザーが一人でもいるか
    pub fn is_qualifying(&self) -> bool {
        self.users.iter().any(|u| u.status.is_active())
    }

    pub fn is_empty(&self) -> bool {
        !self.is_qualifying()
    }

    /// Trackedのユーザーを返す
    pub fn tracked_users(&self) -> impl Iterator<Item = &UserFrame> {
        self.users
            .iter()
            .filter(|u| u.status == TrackingStatus::Tracked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_type_count() {
        assert_eq!(JointType::ALL.len(), JointType::COUNT);
        for (i, joint) in JointType::ALL.iter().enumerate() {
            assert_eq!(*joint as usize, i);
        }
    }

    #[test]
    fn test_joint_type_from_index() {
        assert_eq!(JointType::from_index(0), Some(JointType::Head));
        assert_eq!(JointType::from_index(14), Some(JointType::RightFoot));
        assert_eq!(JointType::from_index(15), None);
    }

    #[test]
    fn test_status_osc_names() {
        assert_eq!(TrackingStatus::None.osc_name(), "none");
        assert_eq!(TrackingStatus::Calibrating.osc_name(), "calibrating");
        assert_eq!(TrackingStatus::Tracked.osc_name(), "tracking");
        assert_eq!(TrackingStatus::Lost.osc_name(), "lost");
    }

    #[test]
    fn test_frame_qualifying() {
        let empty = Frame::new(0.0, vec![UserFrame::new(1, TrackingStatus::Lost)]);
        assert!(empty.is_empty());

        let calibrating = Frame::new(0.0, vec![UserFrame::new(1, TrackingStatus::Calibrating)]);
        assert!(calibrating.is_qualifying());

        assert!(Frame::default().is_empty());
    }

    #[test]
    fn test_ordered_joints_dedup() {
        let user = UserFrame::new(1, TrackingStatus::Tracked).with_joints(vec![
            JointSample::new(JointType::Torso, [0.0, 0.0, 0.0], 1.0),
            JointSample::new(JointType::Head, [1.0, 1.0, 1.0], 0.5),
            JointSample::new(JointType::Torso, [2.0, 2.0, 2.0], 1.0),
        ]);
        let joints = user.ordered_joints();
        assert_eq!(joints.len(), 2);
        assert_eq!(joints[0].joint, JointType::Head);
        assert_eq!(joints[1].position, [2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_confidence_clamped() {
        let sample = JointSample::new(JointType::Head, [0.0; 3], 1.5);
        assert_eq!(sample.confidence, 1.0);
    }

    #[test]
    fn test_frame_json_format() {
        let line = r#"{"timestamp":1.5,"users":[{"id":3,"status":"tracked","joints":[{"joint":"left_hand","position":[1.0,2.0,3.0],"confidence":0.8}]},{"id":4,"status":"calibrating"}]}"#;
        let frame: Frame = serde_json::from_str(line).unwrap();
        assert_eq!(frame.timestamp, 1.5);
        assert_eq!(frame.users.len(), 2);
        assert_eq!(frame.users[0].joints[0].joint, JointType::LeftHand);
        assert_eq!(frame.users[1].status, TrackingStatus::Calibrating);
        assert!(frame.users[1].joints.is_empty());
    }
}
