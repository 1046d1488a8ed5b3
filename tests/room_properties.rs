//! Property tests for the room state machine invariants

use paceline::race::{Player, RoomInstance};
use paceline::transport::RecordingConnection;
use paceline::types::UNFINISHED_POSITION;
use proptest::prelude::*;

const CAP: usize = 8;

fn room_with_players(count: usize) -> RoomInstance {
    let mut room = RoomInstance::new("some passage".to_string(), 10);
    for i in 0..count {
        room.add_player(
            Player::new(format!("p{i}"), format!("P{i}"), RecordingConnection::new()),
            CAP,
        )
        .expect("roster below cap");
    }
    room
}

proptest! {
    /// Finish positions form a contiguous 1-based sequence in receipt
    /// order, and results list finishers first in that order.
    #[test]
    fn finish_positions_follow_receipt_order(
        order in proptest::sample::subsequence(vec![0usize, 1, 2, 3], 0..=4).prop_shuffle()
    ) {
        let mut room = room_with_players(4);
        room.begin_racing().unwrap();

        for (idx, &player) in order.iter().enumerate() {
            let position = room
                .record_finish(&format!("p{player}"), 60.0, 95.0, None)
                .expect("first finish for this player");
            prop_assert_eq!(position, idx as u32 + 1);
        }

        let results = room.results();
        prop_assert_eq!(results.len(), 4);
        for (idx, result) in results.iter().enumerate() {
            if idx < order.len() {
                prop_assert!(result.finished);
                prop_assert_eq!(result.position, idx as u32 + 1);
                prop_assert_eq!(&result.participant_id, &format!("p{}", order[idx]));
            } else {
                prop_assert!(!result.finished);
                prop_assert_eq!(result.position, UNFINISHED_POSITION);
            }
        }
    }

    /// A second finish report never reassigns an existing position.
    #[test]
    fn finish_positions_are_sticky(repeat in 0usize..3) {
        let mut room = room_with_players(3);
        room.begin_racing().unwrap();

        prop_assert_eq!(room.record_finish("p0", 70.0, 96.0, None), Some(1));
        for _ in 0..repeat {
            prop_assert_eq!(room.record_finish("p0", 99.0, 99.0, None), None);
        }
        prop_assert_eq!(room.record_finish("p1", 65.0, 94.0, None), Some(2));
        prop_assert_eq!(room.player("p0").unwrap().finish_position, 1);
    }

    /// Accepted progress is monotone non-decreasing and capped at 100
    /// for any report sequence, including out-of-range values.
    #[test]
    fn progress_is_monotone_and_capped(
        reports in proptest::collection::vec(0u8..=200, 1..40)
    ) {
        let mut room = room_with_players(2);
        room.begin_racing().unwrap();

        let mut last = 0u8;
        for report in reports {
            room.record_progress("p0", report, 60.0, 95.0);
            let current = room.player("p0").unwrap().progress;
            prop_assert!(current >= last);
            prop_assert!(current <= 100);
            last = current;
        }
    }
}
