//! Composite capture identity.
//!
//! Several channel captures recorded in one acquisition run share a
//! `top_level_dir` and are flagged `is_multi_channel`. For display they
//! collapse to one canonical "base" capture: the member with the earliest
//! `created_at`, ties broken by id.
//!
//! Grouping is a read-time view. It is never persisted and never reaches
//! the index; each channel capture keeps its own record and document.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::Capture;

/// A multi-channel acquisition as seen at read time.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeGroup {
    pub top_level_dir: String,
    /// Canonical member.
    pub base: Capture,
    /// All members in canonical order (base first).
    pub members: Vec<Capture>,
}

impl CompositeGroup {
    pub fn channels(&self) -> Vec<&str> {
        self.members.iter().map(|c| c.channel.as_str()).collect()
    }
}

/// Total order used to pick the base capture.
fn canonical_key(capture: &Capture) -> (chrono::DateTime<chrono::Utc>, Uuid) {
    (capture.created_at, capture.id)
}

/// Group the multi-channel captures in `captures` by `top_level_dir`.
///
/// Groups are returned sorted by directory. Deleted captures are ignored.
pub fn composite_groups(captures: &[Capture]) -> Vec<CompositeGroup> {
    let mut by_dir: BTreeMap<&str, Vec<&Capture>> = BTreeMap::new();
    for capture in captures.iter().filter(|c| c.is_multi_channel && !c.is_deleted) {
        by_dir
            .entry(capture.top_level_dir.as_str())
            .or_default()
            .push(capture);
    }

    by_dir
        .into_iter()
        .filter_map(|(dir, mut members)| {
            members.sort_by_key(|c| canonical_key(c));
            members.dedup_by_key(|c| c.id);
            let base = (*members.first()?).clone();
            Some(CompositeGroup {
                top_level_dir: dir.to_string(),
                base,
                members: members.into_iter().cloned().collect(),
            })
        })
        .collect()
}

/// Collapse each composite group to its base capture.
///
/// Solo captures pass through. Output keeps input order: a base capture
/// appears where its group's first member appeared. The result depends only
/// on the set of captures given, not on their order.
pub fn deduplicate(captures: &[Capture]) -> Vec<Capture> {
    let bases: BTreeMap<String, Uuid> = composite_groups(captures)
        .into_iter()
        .map(|g| (g.top_level_dir, g.base.id))
        .collect();

    let mut emitted: Vec<&str> = Vec::new();
    let mut out = Vec::with_capacity(captures.len());

    for capture in captures.iter().filter(|c| !c.is_deleted) {
        if !capture.is_multi_channel {
            out.push(capture.clone());
            continue;
        }
        let dir = capture.top_level_dir.as_str();
        if emitted.contains(&dir) {
            continue;
        }
        let Some(base_id) = bases.get(dir) else {
            continue;
        };
        if let Some(base) = captures.iter().find(|c| c.id == *base_id) {
            out.push(base.clone());
            emitted.push(dir);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CaptureType;
    use chrono::{Duration, TimeZone, Utc};

    fn capture(dir: &str, channel: &str, day: u32, multi: bool) -> Capture {
        let mut c = Capture::new(Uuid::new_v4(), CaptureType::Drf, channel, dir);
        c.created_at = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        c.is_multi_channel = multi;
        c
    }

    #[test]
    fn earliest_member_is_canonical_regardless_of_order() {
        let a = capture("/run-42", "ch0", 1, true);
        let b = capture("/run-42", "ch1", 2, true);

        let ab = deduplicate(&[a.clone(), b.clone()]);
        let ba = deduplicate(&[b.clone(), a.clone()]);
        assert_eq!(ab.len(), 1);
        assert_eq!(ab[0].id, a.id);
        assert_eq!(ba.len(), 1);
        assert_eq!(ba[0].id, a.id);
    }

    #[test]
    fn ties_are_broken_by_id() {
        let mut a = capture("/run-7", "ch0", 3, true);
        let mut b = capture("/run-7", "ch1", 3, true);
        b.created_at = a.created_at;
        if a.id > b.id {
            std::mem::swap(&mut a, &mut b);
        }
        for _ in 0..3 {
            assert_eq!(deduplicate(&[b.clone(), a.clone()])[0].id, a.id);
            assert_eq!(deduplicate(&[a.clone(), b.clone()])[0].id, a.id);
        }
    }

    #[test]
    fn solo_captures_pass_through_in_order() {
        let s1 = capture("/solo-1", "ch0", 5, false);
        let m1 = capture("/multi", "ch0", 2, true);
        let s2 = capture("/solo-2", "ch0", 1, false);
        let m2 = capture("/multi", "ch1", 1, true);

        let out = deduplicate(&[s1.clone(), m1.clone(), s2.clone(), m2.clone()]);
        let ids: Vec<Uuid> = out.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![s1.id, m2.id, s2.id]);
    }

    #[test]
    fn solo_captures_sharing_a_dir_are_not_merged() {
        let a = capture("/shared", "ch0", 1, false);
        let b = capture("/shared", "ch1", 2, false);
        assert_eq!(deduplicate(&[a, b]).len(), 2);
    }

    #[test]
    fn deleted_captures_are_ignored() {
        let a = capture("/run", "ch0", 1, true);
        let mut gone = capture("/run", "ch1", 1, true);
        gone.created_at = a.created_at - Duration::days(1);
        gone.is_deleted = true;
        let out = deduplicate(&[gone, a.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, a.id);
    }

    #[test]
    fn groups_list_members_base_first() {
        let b = capture("/run-9", "ch1", 2, true);
        let a = capture("/run-9", "ch0", 1, true);
        let c = capture("/run-9", "ch2", 3, true);
        let groups = composite_groups(&[b, c, a.clone()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].base.id, a.id);
        assert_eq!(groups[0].channels(), vec!["ch0", "ch1", "ch2"]);
    }
}
