//! Join-time histogram and "earliest members" window.

use std::collections::BTreeMap;

use plugin_core::{ChatMember, Peer};
use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};

const TIMESTAMP: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const MONTH: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]");

#[must_use]
pub fn format_time(at: OffsetDateTime, offset: UtcOffset) -> String {
    at.to_offset(offset)
        .format(TIMESTAMP)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// `YYYY-MM` → number of members who joined that month, ascending.
#[must_use]
pub fn month_histogram(members: &[ChatMember], offset: UtcOffset) -> BTreeMap<String, usize> {
    let mut months = BTreeMap::new();
    for joined in members.iter().filter_map(|m| m.joined_at) {
        if let Ok(key) = joined.to_offset(offset).format(MONTH) {
            *months.entry(key).or_insert(0) += 1;
        }
    }
    months
}

/// Members ranked by join time, 1-based inclusive `[start, end]`.
#[must_use]
pub fn earliest(members: &[ChatMember], start: usize, end: usize) -> Vec<(OffsetDateTime, &Peer)> {
    let mut ranked: Vec<_> = members
        .iter()
        .filter_map(|m| m.joined_at.map(|at| (at, &m.user)))
        .collect();
    ranked.sort_by_key(|(at, _)| *at);
    let from = start.max(1) - 1;
    let to = end.min(ranked.len());
    if from >= to {
        return Vec::new();
    }
    ranked.drain(from..to).collect()
}

fn member_name(peer: &Peer) -> String {
    let name = format!(
        "{} {}",
        peer.first_name.as_deref().unwrap_or_default(),
        peer.last_name.as_deref().unwrap_or_default()
    );
    let name = name.trim();
    if name.is_empty() {
        peer.handle.clone()
    } else {
        name.to_owned()
    }
}

/// Markdown report, or `None` when no member has a known join time.
#[must_use]
pub fn report(members: &[ChatMember], start: usize, end: usize, offset: UtcOffset) -> Option<String> {
    let months = month_histogram(members, offset);
    if months.is_empty() {
        return None;
    }
    let mut out = String::from("Member join times by month:\n");
    for (month, count) in &months {
        out.push_str(&format!("> {month}: **{count}**\n"));
    }
    let window = earliest(members, start, end);
    if !window.is_empty() {
        out.push_str("\nEarliest members:\n");
        for (at, peer) in window {
            out.push_str(&format!("- {} ({})\n", member_name(peer), format_time(at, offset)));
        }
    }
    Some(out)
}
