use itertools::Itertools;

use crate::gamify::{badge, GamifyError};
use crate::models::{LeaderboardEntry, StreakRecord, UserId};

/// Display name used when a user's name can't be resolved.
pub const PLACEHOLDER_NAME: &str = "Anonymous";

/// Ranks `records` by current streak and keeps the top `limit`.
///
/// Ties keep their input order. A name that fails to resolve degrades to
/// [`PLACEHOLDER_NAME`] for that entry only.
pub fn derive_leaderboard<F>(records: &[StreakRecord], resolve_name: F, limit: usize) -> Vec<LeaderboardEntry>
where
    F: Fn(&UserId) -> Result<String, GamifyError>,
{
    records
        .iter()
        .sorted_by_key(|record| std::cmp::Reverse(record.current_streak))
        .take(limit)
        .enumerate()
        .map(|(index, record)| {
            let display_name = resolve_name(&record.user_id).unwrap_or_else(|err| {
                log::warn!("[derive_leaderboard] {err}, using placeholder.");
                String::from(PLACEHOLDER_NAME)
            });

            LeaderboardEntry {
                rank: index + 1,
                display_name,
                badge_name: badge::classify(record.current_streak).name().to_string(),
                streak_value: record.current_streak,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, current: u32) -> StreakRecord {
        StreakRecord {
            user_id: UserId::parse(id).unwrap(),
            current_streak: current,
            longest_streak: current,
            last_date: None,
        }
    }

    fn names(user_id: &UserId) -> Result<String, GamifyError> {
        Ok(format!("name-{user_id}"))
    }

    #[test]
    fn ranks_by_streak_descending() {
        let records = vec![record("a", 3), record("b", 40), record("c", 7)];
        let board = derive_leaderboard(&records, names, 10);

        let summary = board
            .iter()
            .map(|e| (e.rank, e.display_name.as_str(), e.badge_name.as_str(), e.streak_value))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![
            (1, "name-b", "Month Warrior", 40),
            (2, "name-c", "Week Star", 7),
            (3, "name-a", "Starter", 3),
        ]);
    }

    #[test]
    fn ties_keep_input_order() {
        let records = vec![record("first", 5), record("second", 5), record("third", 5)];
        let board = derive_leaderboard(&records, names, 10);

        let order = board.iter().map(|e| e.display_name.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["name-first", "name-second", "name-third"]);
    }

    #[test]
    fn respects_limit_and_input_size() {
        let records = (0..25).map(|i| record(&format!("u{i}"), i)).collect::<Vec<_>>();

        let board = derive_leaderboard(&records, names, 10);
        assert_eq!(board.len(), 10);
        assert!(board.windows(2).all(|w| w[0].streak_value >= w[1].streak_value));
        assert_eq!(board.first().unwrap().streak_value, 24);

        assert_eq!(derive_leaderboard(&records[..3], names, 10).len(), 3);
        assert!(derive_leaderboard(&records, names, 0).is_empty());
    }

    #[test]
    fn failed_names_fall_back_to_placeholder() {
        let records = vec![record("known", 9), record("ghost", 4)];
        let resolve = |user_id: &UserId| match user_id.as_str() {
            "known" => Ok(String::from("Known")),
            other => Err(GamifyError::NameResolutionFailure(other.to_string())),
        };

        let board = derive_leaderboard(&records, resolve, 10);
        assert_eq!(board[0].display_name, "Known");
        assert_eq!(board[1].display_name, PLACEHOLDER_NAME);
        assert_eq!(board[1].rank, 2);
    }

    #[test]
    fn input_is_left_alone() {
        let records = vec![record("a", 1), record("b", 2)];
        let before = records.clone();
        derive_leaderboard(&records, names, 10);
        assert_eq!(records, before);
    }
}
