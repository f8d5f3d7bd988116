use std::collections::BTreeMap;

use tracing::debug;

use crate::frame::{Frame, TrackingStatus, UserId};

/// 送信すべき状態遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub user: UserId,
    pub previous: TrackingStatus,
    pub current: TrackingStatus,
}

/// ユーザーごとの「最後に送信した状態」を保持し、変化だけを返す
///
/// 一度見たユーザーの記録は消さない。同じIDで再登場しても、
/// 状態が送信済みの値と同じなら再送しない。
#[derive(Debug, Default)]
pub struct UserStateTracker {
    last_sent: BTreeMap<UserId, TrackingStatus>,
}

impl UserStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// フレームの状態と送信済み状態を比較し、変化したものをユーザーID昇順で返す
    ///
    /// 返した遷移は即座に送信済みとして記録する（送信失敗は考慮しない）。
    pub fn classify(&mut self, frame: &Frame) -> Vec<StateChange> {
        // 同一フレーム内の重複IDは後勝ち
        let reported: BTreeMap<UserId, TrackingStatus> =
            frame.users.iter().map(|u| (u.id, u.status)).collect();

        let mut changes = Vec::new();
        for (user, current) in reported {
            // 初登場のユーザーも None として台帳に載せる
            let sent = self.last_sent.entry(user).or_default();
            if *sent == current {
                continue;
            }
            debug!("user {}: {} -> {}", user, sent.osc_name(), current.osc_name());
            changes.push(StateChange {
                user,
                previous: *sent,
                current,
            });
            *sent = current;
        }

        changes
    }

    /// 送信済み状態（未登場のユーザーは None）
    pub fn last_sent(&self, user: UserId) -> TrackingStatus {
        self.last_sent.get(&user).copied().unwrap_or_default()
    }

    /// これまでにフレームに現れたユーザー数
    pub fn known_users(&self) -> usize {
        self.last_sent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::UserFrame;

    fn frame(users: &[(UserId, TrackingStatus)]) -> Frame {
        Frame::new(
            0.0,
            users
                .iter()
                .map(|&(id, status)| UserFrame::new(id, status))
                .collect(),
        )
    }

    fn pairs(changes: &[StateChange]) -> Vec<(UserId, TrackingStatus)> {
        changes.iter().map(|c| (c.user, c.current)).collect()
    }

    #[test]
    fn test_single_user_sequence() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();

        assert!(tracker.classify(&frame(&[(1, None)])).is_empty());
        assert_eq!(pairs(&tracker.classify(&frame(&[(1, Tracked)]))), vec![(1, Tracked)]);
        assert!(tracker.classify(&frame(&[(1, Tracked)])).is_empty());
        assert_eq!(pairs(&tracker.classify(&frame(&[(1, Lost)]))), vec![(1, Lost)]);
    }

    #[test]
    fn test_previous_status_reported() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        tracker.classify(&frame(&[(1, Calibrating)]));
        let changes = tracker.classify(&frame(&[(1, Tracked)]));
        assert_eq!(
            changes,
            vec![StateChange {
                user: 1,
                previous: Calibrating,
                current: Tracked
            }]
        );
    }

    #[test]
    fn test_two_users_ascending_order() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        tracker.classify(&frame(&[(1, Calibrating)]));
        let changes = tracker.classify(&frame(&[(2, Calibrating), (1, Tracked)]));
        assert_eq!(pairs(&changes), vec![(1, Tracked), (2, Calibrating)]);
    }

    #[test]
    fn test_absent_user_keeps_record() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        tracker.classify(&frame(&[(5, Tracked)]));
        // いなくなっても記録は残る
        assert!(tracker.classify(&frame(&[])).is_empty());
        assert_eq!(tracker.last_sent(5), Tracked);
        // 同じ状態で再登場しても再送しない
        assert!(tracker.classify(&frame(&[(5, Tracked)])).is_empty());
    }

    #[test]
    fn test_return_to_previous_value_reemits_once() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        tracker.classify(&frame(&[(1, Tracked)]));
        tracker.classify(&frame(&[(1, Lost)]));
        assert_eq!(pairs(&tracker.classify(&frame(&[(1, Tracked)]))), vec![(1, Tracked)]);
        assert!(tracker.classify(&frame(&[(1, Tracked)])).is_empty());
    }

    #[test]
    fn test_oscillation_emits_every_frame() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        for i in 0..10 {
            let status = if i % 2 == 0 { Tracked } else { Lost };
            assert_eq!(tracker.classify(&frame(&[(1, status)])).len(), 1);
        }
    }

    #[test]
    fn test_calibrating_to_lost() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        assert_eq!(pairs(&tracker.classify(&frame(&[(1, Calibrating)]))), vec![(1, Calibrating)]);
        assert_eq!(pairs(&tracker.classify(&frame(&[(1, Lost)]))), vec![(1, Lost)]);
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        let changes = tracker.classify(&frame(&[(1, Calibrating), (1, Tracked)]));
        assert_eq!(pairs(&changes), vec![(1, Tracked)]);
        assert_eq!(tracker.known_users(), 1);
    }

    #[test]
    fn test_user_first_seen_as_none_is_known() {
        use TrackingStatus::*;
        let mut tracker = UserStateTracker::new();
        assert!(tracker.classify(&frame(&[(3, None)])).is_empty());
        assert_eq!(tracker.known_users(), 1);
        assert_eq!(tracker.last_sent(3), None);

        assert_eq!(
            pairs(&tracker.classify(&frame(&[(3, None), (4, Calibrating)]))),
            vec![(4, Calibrating)]
        );
        assert_eq!(tracker.known_users(), 2);
    }
}
