//! Id-sequence grammar used by COPYUID, VANISHED and search ranges.
//!
//! `1,3,2` expands to `[1, 3, 2]`, `4:6` to `[4, 5, 6]` and `9:7` to
//! `[9, 8, 7]`. Tokens that are not valid ids are dropped.

/// Largest valid message id (`2^32 - 1`).
pub const MAX_ID: u64 = 0xFFFF_FFFF;

/// Upper bound on the number of ids one sequence may expand to.
pub const MAX_EXPANDED_IDS: u64 = 1_000_000;

/// Expands an id sequence into individual ids, keeping the written order.
///
/// A sequence covering more than [`MAX_EXPANDED_IDS`] ids expands to nothing.
#[must_use]
pub fn expand(sequence: &str) -> Vec<u64> {
    let mut spans = Vec::new();
    let mut total: u64 = 0;
    for token in sequence.split(',') {
        let span = match token.split_once(':') {
            Some((start, end)) => parse_id(start).zip(parse_id(end)),
            None => parse_id(token).map(|id| (id, id)),
        };
        if let Some((start, end)) = span {
            total += start.abs_diff(end) + 1;
            if total > MAX_EXPANDED_IDS {
                tracing::debug!(total, "Id sequence too large, ignoring it");
                return Vec::new();
            }
            spans.push((start, end));
        }
    }

    let mut ids = Vec::with_capacity(usize::try_from(total).unwrap_or_default());
    for (start, end) in spans {
        if start <= end {
            ids.extend(start..=end);
        } else {
            ids.extend((end..=start).rev());
        }
    }
    ids
}

/// Expands an optional sequence; `None` yields nothing.
#[must_use]
pub fn expand_opt(sequence: Option<&str>) -> Vec<u64> {
    sequence.map(expand).unwrap_or_default()
}

/// Parses a single id in `1..=MAX_ID`.
#[must_use]
pub fn parse_id(token: &str) -> Option<u64> {
    token
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|&id| is_valid_id(id))
}

/// Returns true if `id` can be sent to a server.
#[must_use]
pub const fn is_valid_id(id: u64) -> bool {
    id >= 1 && id <= MAX_ID
}
