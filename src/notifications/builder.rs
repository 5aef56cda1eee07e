//! Title and message wording for each notification category.

use crate::detector::FloorIncrease;
use crate::models::{
    FeedbackReply, FloorSummary, FloorUpdate, NewNotification, NotificationKind, Priority,
    RawReading, SpotAvailable,
};

pub const FLOOR_UPDATE_TITLE: &str = "Floor Update";
pub const FEEDBACK_REPLY_TITLE: &str = "Reply to your feedback";

/// One batched notification for every slot that opened up on `floor`.
pub fn spot_available(floor: u32, readings: &[RawReading]) -> NewNotification {
    let spot_ids: Vec<String> = readings
        .iter()
        .filter_map(|r| r.slot_name.clone())
        .collect();
    let count = spot_ids.len() as u32;

    let message = match spot_ids.as_slice() {
        [only] => format!("Spot {only} just opened up on Floor {floor}."),
        ids => format!(
            "{} spots just opened up on Floor {floor}: {}.",
            ids.len(),
            ids.join(", ")
        ),
    };

    NewNotification::new(
        NotificationKind::SpotAvailable(SpotAvailable {
            spots_available: count,
            floor: Some(floor),
            spot_ids: Some(spot_ids),
        }),
        format!("Parking available on Floor {floor}"),
        message,
    )
    .with_priority(Priority::High)
}

pub fn floor_update(increase: &FloorIncrease, summary: Option<&FloorSummary>) -> NewNotification {
    let total = summary.map(|s| s.total).unwrap_or(increase.to);
    NewNotification::new(
        NotificationKind::FloorUpdate(FloorUpdate {
            floor: increase.floor,
            available_spots: increase.to,
            total_spots: total,
            previous_available: Some(increase.from),
        }),
        FLOOR_UPDATE_TITLE,
        format!(
            "Floor {} now has {} of {} spots free (was {}).",
            increase.floor, increase.to, total, increase.from
        ),
    )
}

pub fn feedback_reply(reply: FeedbackReply) -> NewNotification {
    let message = match reply.admin_name.as_deref() {
        Some(name) => format!("{name} replied: {}", reply.admin_reply),
        None => format!("An admin replied: {}", reply.admin_reply),
    };
    NewNotification::new(NotificationKind::FeedbackReply(reply), FEEDBACK_REPLY_TITLE, message)
}

pub fn general(title: impl Into<String>, message: impl Into<String>) -> NewNotification {
    NewNotification::new(NotificationKind::General, title, message).with_priority(Priority::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::reading;
    use chrono::Utc;

    #[test]
    fn single_spot_wording() {
        let n = spot_available(4, &[reading(1, "A1", false, "4th floor")]);
        assert_eq!(n.title, "Parking available on Floor 4");
        assert_eq!(n.message, "Spot A1 just opened up on Floor 4.");
        assert_eq!(n.priority, Priority::High);
        match n.kind {
            NotificationKind::SpotAvailable(payload) => {
                assert_eq!(payload.spots_available, 1);
                assert_eq!(payload.floor, Some(4));
                assert_eq!(payload.spot_ids, Some(vec!["A1".to_string()]));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn batched_spots_wording() {
        let n = spot_available(
            1,
            &[
                reading(1, "B1", false, "1st floor"),
                reading(2, "B2", false, "1st floor"),
            ],
        );
        assert_eq!(n.message, "2 spots just opened up on Floor 1: B1, B2.");
    }

    #[test]
    fn floor_update_uses_summary_total() {
        let increase = FloorIncrease { floor: 3, from: 2, to: 5 };
        let summary = FloorSummary::new(3, 20, 5);
        let n = floor_update(&increase, Some(&summary));
        assert_eq!(n.title, FLOOR_UPDATE_TITLE);
        assert_eq!(n.message, "Floor 3 now has 5 of 20 spots free (was 2).");
    }

    #[test]
    fn feedback_reply_names_admin() {
        let reply = FeedbackReply::new("fb-9", "Lights out on level 2", "Fixed", Some("Dana".into()), Utc::now());
        let n = feedback_reply(reply);
        assert_eq!(n.message, "Dana replied: Fixed");
    }
}
