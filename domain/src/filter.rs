//! Case-insensitive search filtering shared by the admin views.

use crate::{AttendanceRecord, FlaggedLog};

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Records whose name or roll number contains the query, case-insensitively.
/// An empty query keeps everything.
pub fn filter_records<'a>(records: &'a [AttendanceRecord], query: &str) -> Vec<&'a AttendanceRecord> {
    let q = query.trim().to_lowercase();
    records
        .iter()
        .filter(|r| q.is_empty() || contains_ci(&r.name, &q) || contains_ci(&r.roll_no, &q))
        .collect()
}

/// Generic name filter for reference-data views (institutions, venues).
pub fn filter_named<'a, T>(items: &'a [T], query: &str, name: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let q = query.trim().to_lowercase();
    items
        .iter()
        .filter(|item| q.is_empty() || contains_ci(name(item), &q))
        .collect()
}

pub fn filter_flagged<'a>(logs: &'a [FlaggedLog], query: &str) -> Vec<&'a FlaggedLog> {
    let q = query.trim().to_lowercase();
    logs.iter()
        .filter(|l| {
            q.is_empty()
                || l.roll_no.as_deref().is_some_and(|r| contains_ci(r, &q))
                || contains_ci(&l.reason, &q)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: i64, name: &str, roll: &str) -> AttendanceRecord {
        AttendanceRecord {
            id,
            session_id: "s".into(),
            name: name.into(),
            email: format!("{roll}@example.edu"),
            roll_no: roll.into(),
            phone: "9876543210".into(),
            branch: "CSE".into(),
            section: "A".into(),
            marked_at: Utc::now(),
            venue_name: None,
            selfie_url: None,
            location_lat: None,
            location_lon: None,
        }
    }

    #[test]
    fn matches_by_name_case_insensitively() {
        let records = vec![record(1, "Asha Rao", "21CS042"), record(2, "Vikram Shah", "21EC007")];
        let hits = filter_records(&records, "asha");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn matches_by_roll_number() {
        let records = vec![record(1, "Asha Rao", "21CS042"), record(2, "Vikram Shah", "21EC007")];
        let hits = filter_records(&records, "21ec");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[test]
    fn empty_query_keeps_everything() {
        let records = vec![record(1, "A", "1"), record(2, "B", "2")];
        assert_eq!(filter_records(&records, "  ").len(), 2);
    }

    #[test]
    fn no_match_yields_empty() {
        let records = vec![record(1, "Asha Rao", "21CS042")];
        assert!(filter_records(&records, "zzz").is_empty());
    }
}
