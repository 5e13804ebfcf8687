//! Date buckets for the conversation sidebar.
//!
//! Grouping is a pure function of the items, a reference time and a locale.
//! The reference time's zone decides where "midnight" falls.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::store::core::conversation::LastModified;
use crate::store::grouping::month_names::{month_name, resolve_locale};

/// Which bucket a group represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GroupKind {
    /// Modified since local midnight (or in the future).
    Today,
    /// Modified during the previous calendar day.
    Yesterday,
    /// Modified within the last seven calendar days.
    Previous7Days,
    /// Modified within the last thirty calendar days.
    Previous30Days,
    /// Older items, one bucket per calendar month.
    Month {
        /// Calendar year.
        year: i32,
        /// Month, 1-based.
        month: u32,
    },
}

impl GroupKind {
    /// English title for the fixed buckets; `None` for month buckets.
    #[must_use]
    pub const fn fixed_title(self) -> Option<&'static str> {
        match self {
            Self::Today => Some("Today"),
            Self::Yesterday => Some("Yesterday"),
            Self::Previous7Days => Some("Previous 7 Days"),
            Self::Previous30Days => Some("Previous 30 Days"),
            Self::Month { .. } => None,
        }
    }
}

/// One display bucket.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationGroup<T> {
    /// Bucket identity.
    pub kind: GroupKind,
    /// Display label, e.g. `Today` or `January 2024`.
    pub title: String,
    /// Items, newest first.
    pub conversations: Vec<T>,
}

struct Boundaries {
    today: i64,
    yesterday: i64,
    seven_days_ago: i64,
    thirty_days_ago: i64,
}

/// Partition `conversations` into ordered display buckets.
///
/// Items are sorted by `last_modified` descending (stable, so ties keep input
/// order) and placed in the first bucket whose lower bound they reach. Bounds
/// are inclusive. Month buckets follow the fixed ones, most recent first.
#[must_use]
pub fn group_conversations<T, Tz>(
    conversations: &[T],
    reference: &DateTime<Tz>,
    locale: &str,
) -> Vec<ConversationGroup<T>>
where
    T: LastModified + Clone,
    Tz: TimeZone,
{
    let tz = reference.timezone();
    let bounds = boundaries(&tz, reference.date_naive());

    let mut sorted: Vec<T> = conversations.to_vec();
    sorted.sort_by(|a, b| b.last_modified().cmp(&a.last_modified()));

    let mut fixed: [Vec<T>; 4] = Default::default();
    let mut months: BTreeMap<(i32, u32), Vec<T>> = BTreeMap::new();

    for item in sorted {
        let ts = item.last_modified();
        if ts >= bounds.today {
            fixed[0].push(item);
        } else if ts >= bounds.yesterday {
            fixed[1].push(item);
        } else if ts >= bounds.seven_days_ago {
            fixed[2].push(item);
        } else if ts >= bounds.thirty_days_ago {
            fixed[3].push(item);
        } else {
            months.entry(local_year_month(&tz, ts)).or_default().push(item);
        }
    }

    let kinds = [
        GroupKind::Today,
        GroupKind::Yesterday,
        GroupKind::Previous7Days,
        GroupKind::Previous30Days,
    ];
    let mut groups: Vec<ConversationGroup<T>> = kinds
        .into_iter()
        .zip(fixed)
        .filter(|(_, items)| !items.is_empty())
        .map(|(kind, items)| ConversationGroup {
            kind,
            title: kind.fixed_title().unwrap_or_default().to_string(),
            conversations: items,
        })
        .collect();

    if !months.is_empty() {
        let locale = resolve_locale(locale);
        groups.extend(months.into_iter().rev().map(|((year, month), items)| {
            ConversationGroup {
                kind: GroupKind::Month { year, month },
                title: format!("{} {year}", month_name(month, locale)),
                conversations: items,
            }
        }));
    }

    groups
}

fn boundaries<Tz: TimeZone>(tz: &Tz, today: NaiveDate) -> Boundaries {
    let days_back = |n: u64| {
        today
            .checked_sub_days(Days::new(n))
            .map_or(i64::MIN, |date| local_midnight_ms(tz, date))
    };
    Boundaries {
        today: local_midnight_ms(tz, today),
        yesterday: days_back(1),
        seven_days_ago: days_back(7),
        thirty_days_ago: days_back(30),
    }
}

/// Epoch milliseconds of the first instant of `date` in `tz`.
fn local_midnight_ms<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    // A DST gap can swallow midnight; the day then starts at the first valid hour.
    (0..24)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| tz.from_local_datetime(&date.and_time(time)).earliest())
        .map_or_else(
            || date.and_time(NaiveTime::MIN).and_utc().timestamp_millis(),
            |start| start.timestamp_millis(),
        )
}

fn local_year_month<Tz: TimeZone>(tz: &Tz, ts: i64) -> (i32, u32) {
    use chrono::Datelike;

    let local = DateTime::<Utc>::from_timestamp_millis(ts)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .with_timezone(tz);
    (local.year(), local.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, FixedOffset};

    use crate::store::core::conversation::ConversationMeta;
    use crate::store::core::ids::ConversationId;

    fn meta(name: &str, last_modified: i64) -> ConversationMeta {
        ConversationMeta {
            id: ConversationId::new(),
            name: name.to_string(),
            last_modified,
            message_count: 0,
        }
    }

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 14, 12, 0, 0).unwrap()
    }

    fn ms(at: DateTime<Utc>) -> i64 {
        at.timestamp_millis()
    }

    fn summary<T: LastModified>(groups: &[ConversationGroup<T>]) -> Vec<(String, usize)> {
        groups
            .iter()
            .map(|g| (g.title.clone(), g.conversations.len()))
            .collect()
    }

    #[test]
    fn test_reference_scenario() {
        let now = reference();
        let items = vec![
            meta("month", ms(now - Duration::days(40))),
            meta("now", ms(now)),
            meta("three days", ms(now - Duration::days(3))),
            meta("two hours", ms(now - Duration::hours(2))),
        ];

        let groups = group_conversations(&items, &now, "en-US");

        assert_eq!(
            summary(&groups),
            vec![
                ("Today".to_string(), 2),
                ("Previous 7 Days".to_string(), 1),
                ("January 2024".to_string(), 1),
            ]
        );
        assert_eq!(groups[0].conversations[0].name, "now");
        assert_eq!(groups[0].conversations[1].name, "two hours");
        assert_eq!(groups[1].conversations[0].name, "three days");
        assert_eq!(groups[2].kind, GroupKind::Month { year: 2024, month: 1 });
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let now = reference();
        let midnight = Utc.with_ymd_and_hms(2024, 2, 14, 0, 0, 0).unwrap();
        let items = vec![
            meta("today", ms(midnight)),
            meta("yesterday", ms(midnight - Duration::days(1))),
            meta("before yesterday", ms(midnight - Duration::days(1)) - 1),
            meta("seven", ms(midnight - Duration::days(7))),
            meta("just older than seven", ms(midnight - Duration::days(7)) - 1),
            meta("thirty", ms(midnight - Duration::days(30))),
            meta("just older than thirty", ms(midnight - Duration::days(30)) - 1),
        ];

        let groups = group_conversations(&items, &now, "en-US");
        let names: Vec<(GroupKind, Vec<&str>)> = groups
            .iter()
            .map(|g| (g.kind, g.conversations.iter().map(|c| c.name.as_str()).collect()))
            .collect();

        assert_eq!(
            names,
            vec![
                (GroupKind::Today, vec!["today"]),
                (GroupKind::Yesterday, vec!["yesterday"]),
                (GroupKind::Previous7Days, vec!["before yesterday", "seven"]),
                (
                    GroupKind::Previous30Days,
                    vec!["just older than seven", "thirty"]
                ),
                (
                    GroupKind::Month { year: 2024, month: 1 },
                    vec!["just older than thirty"]
                ),
            ]
        );
    }

    #[test]
    fn test_future_items_are_today() {
        let now = reference();
        let items = vec![meta("future", ms(now + Duration::days(3)))];

        let groups = group_conversations(&items, &now, "en-US");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].kind, GroupKind::Today);
    }

    #[test]
    fn test_ties_keep_input_order_and_grouping_is_idempotent() {
        let now = reference();
        let stamp = ms(now - Duration::hours(1));
        let items = vec![
            meta("a", stamp),
            meta("b", stamp),
            meta("old", ms(now - Duration::days(400))),
            meta("c", stamp),
        ];

        let first = group_conversations(&items, &now, "en-US");
        let second = group_conversations(&items, &now, "en-US");
        assert_eq!(first, second);

        let flattened: Vec<ConversationMeta> = first
            .iter()
            .flat_map(|g| g.conversations.clone())
            .collect();
        let regrouped = group_conversations(&flattened, &now, "en-US");
        assert_eq!(regrouped, first);

        let today: Vec<&str> = first[0]
            .conversations
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(today, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_month_buckets_are_most_recent_first() {
        let now = reference();
        let items = vec![
            meta("dec 2022", ms(Utc.with_ymd_and_hms(2022, 12, 31, 10, 0, 0).unwrap())),
            meta("nov 2023", ms(Utc.with_ymd_and_hms(2023, 11, 2, 10, 0, 0).unwrap())),
            meta("dec 2023", ms(Utc.with_ymd_and_hms(2023, 12, 1, 10, 0, 0).unwrap())),
        ];

        let titles: Vec<String> = group_conversations(&items, &now, "en-US")
            .into_iter()
            .map(|g| g.title)
            .collect();

        assert_eq!(
            titles,
            vec!["December 2023", "November 2023", "December 2022"]
        );
    }

    #[test]
    fn test_localized_month_titles() {
        let now = reference();
        let items = vec![meta("old", ms(now - Duration::days(40)))];

        let groups = group_conversations(&items, &now, "fr-FR");
        assert_eq!(groups[0].title, "janvier 2024");

        let fallback = group_conversations(&items, &now, "default");
        assert_eq!(fallback[0].title, "January 2024");
    }

    #[test]
    fn test_midnight_follows_reference_zone() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        // 01:00 local on Feb 14, 23:00 UTC on Feb 13.
        let now = plus_two.with_ymd_and_hms(2024, 2, 14, 1, 0, 0).unwrap();
        let local_early = Utc.with_ymd_and_hms(2024, 2, 13, 22, 30, 0).unwrap();
        let local_late_yesterday = Utc.with_ymd_and_hms(2024, 2, 13, 21, 30, 0).unwrap();
        let items = vec![
            meta("after local midnight", ms(local_early)),
            meta("before local midnight", ms(local_late_yesterday)),
        ];

        let groups = group_conversations(&items, &now, "en-US");

        assert_eq!(groups[0].kind, GroupKind::Today);
        assert_eq!(groups[0].conversations[0].name, "after local midnight");
        assert_eq!(groups[1].kind, GroupKind::Yesterday);
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<ConversationMeta> = Vec::new();
        assert!(group_conversations(&items, &reference(), "en-US").is_empty());
    }
}
