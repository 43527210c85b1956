//! Proptest generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use axon_core::{Fingerprint, Keypair, Period, StringRange};

/// Generate a canonical fingerprint (16 lowercase hex characters).
pub fn fingerprint() -> impl Strategy<Value = Fingerprint> {
    "[0-9a-f]{16}".prop_map(|s| Fingerprint::parse(&s).expect("generated canonical form"))
}

/// Generate a deterministic keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a timestamp within the realizable timeline (the release
/// epoch through the end of 2027).
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    let start = axon_core::release_epoch().timestamp();
    let end = Utc
        .with_ymd_and_hms(2027, 12, 31, 23, 59, 59)
        .single()
        .map(|t| t.timestamp())
        .unwrap_or(start);
    (start..end).prop_map(|secs| {
        DateTime::from_timestamp(secs, 0).unwrap_or_else(axon_core::release_epoch)
    })
}

/// Generate a realized, non-empty period.
pub fn period() -> impl Strategy<Value = Period> {
    (timestamp(), 1i64..90).prop_map(|(start, days)| {
        Period::new(start, start + chrono::Duration::days(days))
    })
}

/// Generate a single-character fingerprint interval like the session's
/// initial user partitions.
pub fn fingerprint_range() -> impl Strategy<Value = StringRange> {
    prop_oneof![
        (b'0'..=b'9').prop_map(|c| StringRange::new(
            (c as char).to_string(),
            ((c + 1) as char).to_string()
        )),
        (b'a'..=b'y').prop_map(|c| StringRange::new(
            (c as char).to_string(),
            ((c + 1) as char).to_string()
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_fingerprints_are_canonical(fp in fingerprint()) {
            prop_assert!(Fingerprint::is_canonical(fp.as_str()));
        }

        #[test]
        fn generated_periods_are_realizable(p in period()) {
            let now = Utc::now();
            let (start, end) = p.realize(now);
            prop_assert!(start < end);
        }

        #[test]
        fn splitting_preserves_coverage(p in period(), n in 1usize..12) {
            let now = Utc::now();
            let parts = p.split(n, now);
            prop_assert_eq!(parts.len(), n);
            prop_assert_eq!(parts.first().unwrap().realize_start(), p.realize_start());
            prop_assert_eq!(parts.last().unwrap().realize_end(now), p.realize_end(now));
            for pair in parts.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
        }

        #[test]
        fn keypair_fingerprint_matches_public_key(kp in keypair()) {
            prop_assert_eq!(kp.fingerprint(), kp.public_key().fingerprint().unwrap());
        }
    }
}
