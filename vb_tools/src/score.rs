//! VeriScore: a 0-100 health score attached to RBL, SSL and scan results.

/// Share of DNSBL zones that do not list the address.
///
/// Returns `None` when no zone answered.
pub fn rbl_score(zones_checked: usize, listed: usize) -> Option<u8> {
    if zones_checked == 0 {
        return None;
    }
    let clean = zones_checked.saturating_sub(listed);
    Some((100 * clean / zones_checked) as u8)
}

/// Certificate score: 0 outside the validity window, otherwise 100 with
/// penalties as expiry approaches
pub fn ssl_score(days_remaining: i64, expired: bool, not_yet_valid: bool) -> u8 {
    if expired || not_yet_valid {
        return 0;
    }
    let mut score: i64 = 100;
    if days_remaining < 7 {
        score -= 40;
    }
    if days_remaining < 30 {
        score -= 20;
    }
    score.clamp(0, 100) as u8
}

/// Rounded mean of the scores that are present
pub fn aggregate_score<I>(scores: I) -> Option<u8>
where
    I: IntoIterator<Item = Option<u8>>,
{
    let (sum, n) = scores
        .into_iter()
        .flatten()
        .fold((0u32, 0u32), |(sum, n), s| (sum + u32::from(s), n + 1));
    if n == 0 {
        None
    } else {
        Some(((sum + n / 2) / n) as u8)
    }
}
