use crate::models::{ClusterKey, Market};

/// Map a market to its identity cluster.
///
/// Precedence: event id, group, normalized slug prefix, question family or
/// truncated normalized question, and finally the market id itself, so every market lands in exactly one
/// cluster. Pure and total.
pub fn assign(market: &Market) -> ClusterKey {
    if let Some(event_id) = non_empty(market.event_id.as_deref()) {
        return ClusterKey::new(format!("event:{event_id}"));
    }

    if let Some(group) = market.group_id.as_deref().map(normalize_text) {
        if !group.is_empty() {
            return ClusterKey::new(format!("group:{group}"));
        }
    }

    if let Some(slug) = non_empty(market.slug.as_deref()) {
        let prefix = normalize_text(slug_prefix(slug));
        if !prefix.is_empty() {
            return ClusterKey::new(format!("slug:{prefix}"));
        }
    }

    if let Some(question) = market.question.as_deref().map(question_key) {
        if !question.is_empty() {
            return ClusterKey::new(format!("q:{question}"));
        }
    }

    ClusterKey::new(format!("market:{}", market.market_id))
}

/// Questions longer than this share a cluster when their heads agree.
const QUESTION_KEY_CHARS: usize = 60;

/// Family name for questions that are one contest asked per contestant.
fn question_family(normalized: &str) -> Option<&'static str> {
    if normalized.starts_with("will ") && normalized.contains(" win super bowl 2026") {
        Some("super_bowl_2026_winner")
    } else if normalized.contains("nfc championship") {
        Some("nfc_championship")
    } else if normalized.contains("afc championship") {
        Some("afc_championship")
    } else if normalized.contains("gta vi") || normalized.contains("gta 6") {
        Some("gta_6")
    } else {
        None
    }
}

fn question_key(question: &str) -> String {
    let normalized = normalize_text(question);
    if let Some(family) = question_family(&normalized) {
        return family.to_string();
    }
    let head: String = normalized.chars().take(QUESTION_KEY_CHARS).collect();
    head.trim_end().to_string()
}

/// Lowercase, turn every run of non-alphanumerics into a single space, trim.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Strip the per-instance tail of a slug: everything from a `-YYYY-MM-DD`
/// date onward, or everything after a `--` separator.
fn slug_prefix(slug: &str) -> &str {
    if let Some(idx) = find_date_suffix(slug) {
        return &slug[..idx];
    }
    match slug.find("--") {
        Some(idx) => &slug[..idx],
        None => slug,
    }
}

fn find_date_suffix(slug: &str) -> Option<usize> {
    let bytes = slug.as_bytes();
    // "-YYYY-MM-DD" is 11 bytes
    if bytes.len() < 11 {
        return None;
    }

    (0..=bytes.len() - 11).find(|&i| {
        let w = &bytes[i..i + 11];
        w[0] == b'-'
            && w[1..5].iter().all(u8::is_ascii_digit)
            && w[5] == b'-'
            && w[6..8].iter().all(u8::is_ascii_digit)
            && w[8] == b'-'
            && w[9..11].iter().all(u8::is_ascii_digit)
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_market(id: &str) -> Market {
        Market::new(id)
    }

    #[test]
    fn test_event_id_wins_over_slug() {
        let mut a = make_market("m1");
        a.event_id = Some("E1".into());
        a.slug = Some("will-trump-win".into());

        let mut b = make_market("m2");
        b.event_id = Some("E1".into());
        b.slug = Some("completely-different".into());

        assert_eq!(assign(&a), assign(&b));
        assert_eq!(assign(&a).as_str(), "event:E1");
    }

    #[test]
    fn test_group_before_slug() {
        let mut m = make_market("m1");
        m.group_id = Some("  Super   Bowl ".into());
        m.slug = Some("ignored".into());
        assert_eq!(assign(&m).as_str(), "group:super bowl");
    }

    #[test]
    fn test_slug_date_suffix_stripped() {
        let mut a = make_market("m1");
        a.slug = Some("btc-above-100k-2026-01-05".into());
        let mut b = make_market("m2");
        b.slug = Some("BTC-Above-100k-2026-02-11-extra".into());

        assert_eq!(assign(&a), assign(&b));
        assert_eq!(assign(&a).as_str(), "slug:btc above 100k");
    }

    #[test]
    fn test_slug_double_dash_split() {
        let mut m = make_market("m1");
        m.slug = Some("fed-decision--march".into());
        assert_eq!(assign(&m).as_str(), "slug:fed decision");
    }

    #[test]
    fn test_question_case_and_whitespace_insensitive() {
        let mut a = make_market("m1");
        a.question = Some("Will  GTA VI release in 2026?".into());
        let mut b = make_market("m2");
        b.question = Some("will gta vi   release in 2026".into());

        assert_eq!(assign(&a), assign(&b));
    }

    #[test]
    fn test_super_bowl_contestants_share_a_cluster() {
        let mut a = make_market("m1");
        a.question = Some("Will the Chiefs win Super Bowl 2026?".into());
        let mut b = make_market("m2");
        b.question = Some("Will the Bills win Super Bowl 2026?".into());

        assert_eq!(assign(&a), assign(&b));
        assert_eq!(assign(&a).as_str(), "q:super_bowl_2026_winner");
    }

    #[test]
    fn test_question_families() {
        let key = |q: &str| {
            let mut m = make_market("m");
            m.question = Some(q.into());
            assign(&m).as_str().to_string()
        };

        assert_eq!(key("Who wins the NFC Championship?"), "q:nfc_championship");
        assert_eq!(key("Will the Eagles reach the NFC championship game?"), "q:nfc_championship");
        assert_eq!(key("AFC Championship: Ravens vs Bills"), "q:afc_championship");
        assert_eq!(key("GTA 6 delayed again?"), "q:gta_6");
        assert_eq!(key("Will GTA VI cost $100?"), "q:gta_6");
        // the Super Bowl family needs the "will ... win" shape
        assert_eq!(key("Super Bowl 2026 halftime show"), "q:super bowl 2026 halftime show");
    }

    #[test]
    fn test_long_questions_cluster_on_their_head() {
        let head = "Will the average global temperature anomaly for the month exceed";
        let mut a = make_market("m1");
        a.question = Some(format!("{head} 1.2C in March 2026 according to NASA GISTEMP?"));
        let mut b = make_market("m2");
        b.question = Some(format!("{head} 1.5C in April 2026 according to NOAA?"));

        let key = assign(&a);
        assert_eq!(key, assign(&b));
        assert_eq!(key.as_str().chars().count(), "q:".len() + 60);
    }

    #[test]
    fn test_short_questions_still_distinct() {
        let mut a = make_market("m1");
        a.question = Some("Fed cuts rates in March?".into());
        let mut b = make_market("m2");
        b.question = Some("Fed cuts rates in June?".into());
        assert_ne!(assign(&a), assign(&b));
    }

    #[test]
    fn test_blank_fields_fall_through_to_market_id() {
        let mut m = make_market("0xabc");
        m.event_id = Some("   ".into());
        m.group_id = Some("--".into());
        m.slug = Some("".into());
        m.question = Some("?!".into());
        assert_eq!(assign(&m).as_str(), "market:0xabc");
    }

    #[test]
    fn test_assign_is_deterministic() {
        let mut m = make_market("m1");
        m.question = Some("Who wins the NFC Championship?".into());
        let first = assign(&m);
        for _ in 0..10 {
            assert_eq!(assign(&m), first);
        }
    }
}
