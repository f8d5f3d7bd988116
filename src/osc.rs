use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use tracing::trace;

use crate::error::EncodeError;
use crate::frame::{JointSample, JointType, TrackingStatus, UserId};

/// 受信側のデフォルトアドレス
pub const DEFAULT_TARGET_ADDR: &str = "127.0.0.1:15002";

/// 1パケットの最大バイト数（デフォルト）
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024;

/// "#bundle\0" + タイムタグ
const BUNDLE_HEADER_SIZE: usize = 16;

/// バンドル内の各要素の長さプレフィックス
const ELEMENT_SIZE_PREFIX: usize = 4;

/// 即時実行のタイムタグ
const IMMEDIATELY: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// セッション開始: 引数なし
pub fn session_begin() -> OscMessage {
    OscMessage {
        addr: "/session/begin".to_string(),
        args: vec![],
    }
}

/// フレーム開始: タイムスタンプ（秒）
pub fn frame_begin(timestamp: f64) -> OscMessage {
    OscMessage {
        addr: "/frame/begin".to_string(),
        args: vec![OscType::Float(timestamp as f32)],
    }
}

/// 状態変化: 新しい状態名
pub fn user_state(user: UserId, status: TrackingStatus) -> OscMessage {
    OscMessage {
        addr: format!("/user/{}/state", user),
        args: vec![OscType::String(status.osc_name().to_string())],
    }
}

/// 関節データ: x, y, z, confidence
pub fn joint(user: UserId, sample: &JointSample) -> OscMessage {
    OscMessage {
        addr: format!("/user/{}/joint/{}", user, sample.joint.name()),
        args: vec![
            OscType::Float(sample.position[0]),
            OscType::Float(sample.position[1]),
            OscType::Float(sample.position[2]),
            OscType::Float(sample.confidence),
        ],
    }
}

/// OSCメッセージをバイト列にエンコード
pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>, EncodeError> {
    let packet = OscPacket::Message(msg.clone());
    Ok(encoder::encode(&packet)?)
}

/// スキーマ上で最も大きくなるメッセージの、バンドル1個に入れたときのサイズ
pub fn largest_message_packet_size() -> Result<usize, EncodeError> {
    let longest_status = [
        TrackingStatus::None,
        TrackingStatus::Calibrating,
        TrackingStatus::Tracked,
        TrackingStatus::Lost,
    ]
    .into_iter()
    .max_by_key(|s| s.osc_name().len())
    .unwrap_or_default();
    let longest_joint = JointType::ALL
        .into_iter()
        .max_by_key(|j| j.name().len())
        .unwrap_or(JointType::LeftShoulder);

    let candidates = [
        session_begin(),
        frame_begin(0.0),
        user_state(UserId::MAX, longest_status),
        joint(
            UserId::MAX,
            &JointSample::new(longest_joint, [0.0; 3], 0.0),
        ),
    ];

    let mut largest = 0;
    for msg in &candidates {
        let size = BUNDLE_HEADER_SIZE + ELEMENT_SIZE_PREFIX + encode_message(msg)?.len();
        largest = largest.max(size);
    }
    Ok(largest)
}

/// メッセージをバンドルに詰め、最大サイズを超える前に封をする
///
/// 封をしたバンドルはエンコード済みのバイト列として呼び出し側に返す。
pub struct PacketBuilder {
    max_size: usize,
    pending: Vec<OscPacket>,
    pending_size: usize,
}

impl PacketBuilder {
    /// 最大サイズでスキーマ内の全メッセージが収まるか検証してから作成
    pub fn new(max_size: usize) -> Result<Self, EncodeError> {
        let required = largest_message_packet_size()?;
        if required > max_size {
            return Err(EncodeError::MessageTooLarge {
                address: "/user/{id}/joint/{name}".to_string(),
                size: required,
                max: max_size,
            });
        }
        Ok(Self {
            max_size,
            pending: Vec::new(),
            pending_size: BUNDLE_HEADER_SIZE,
        })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// 封をしていないメッセージ数
    pub fn pending_messages(&self) -> usize {
        self.pending.len()
    }

    /// メッセージを追加する
    ///
    /// 追加すると最大サイズを超える場合は、現在のバンドルを封をして返し、
    /// そのメッセージから新しいバンドルを始める。
    pub fn push(&mut self, msg: OscMessage) -> Result<Option<Vec<u8>>, EncodeError> {
        let element_size = ELEMENT_SIZE_PREFIX + encode_message(&msg)?.len();
        if BUNDLE_HEADER_SIZE + element_size > self.max_size {
            return Err(EncodeError::MessageTooLarge {
                address: msg.addr,
                size: BUNDLE_HEADER_SIZE + element_size,
                max: self.max_size,
            });
        }

        let sealed = if self.pending_size + element_size > self.max_size {
            self.seal()?
        } else {
            None
        };

        trace!("queue {} ({} bytes)", msg.addr, element_size);
        self.pending.push(OscPacket::Message(msg));
        self.pending_size += element_size;
        Ok(sealed)
    }

    /// 残りのメッセージを封をして返す（空なら None）
    pub fn flush(&mut self) -> Result<Option<Vec<u8>>, EncodeError> {
        self.seal()
    }

    fn seal(&mut self) -> Result<Option<Vec<u8>>, EncodeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let bundle = OscPacket::Bundle(OscBundle {
            timetag: IMMEDIATELY,
            content: std::mem::take(&mut self.pending),
        });
        self.pending_size = BUNDLE_HEADER_SIZE;
        let data = encoder::encode(&bundle)?;
        debug_assert!(data.len() <= self.max_size);
        Ok(Some(data))
    }
}
