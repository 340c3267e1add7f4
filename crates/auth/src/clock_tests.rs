// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{mint, FixedTime};

const NOW_MS: i64 = 1_700_000_000_000;
const THRESHOLD: Duration = Duration::from_secs(300);

fn fixed_clock() -> CredentialClock {
    CredentialClock::new(Arc::new(FixedTime(NOW_MS)))
}

#[test]
fn decode_reads_exp_and_keeps_other_claims() -> anyhow::Result<()> {
    let claims = decode(&mint(1_700_000_600, "user-1"))?;
    assert_eq!(claims.exp, 1_700_000_600);
    assert_eq!(claims.expires_at_ms(), 1_700_000_600_000);
    assert_eq!(claims.extra.get("sub").and_then(|v| v.as_str()), Some("user-1"));
    Ok(())
}

#[test]
fn decode_tolerates_padded_payload() -> anyhow::Result<()> {
    let token = mint(1_700_000_600, "u");
    let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
    while parts[1].len() % 4 != 0 {
        parts[1].push('=');
    }
    let claims = decode(&parts.join("."))?;
    assert_eq!(claims.exp, 1_700_000_600);
    Ok(())
}

#[yare::parameterized(
    one_segment = { "abc", DecodeError::Segments(1) },
    two_segments = { "abc.def", DecodeError::Segments(2) },
    four_segments = { "a.b.c.d", DecodeError::Segments(4) },
    empty = { "", DecodeError::Segments(1) },
    bad_base64 = { "aGVhZGVy.!!!.c2ln", DecodeError::Base64 },
)]
fn decode_rejects_structure(token: &str, expected: DecodeError) {
    assert_eq!(decode(token).err(), Some(expected));
}

#[test]
fn decode_rejects_non_json_payload() {
    let payload = URL_SAFE_NO_PAD.encode("not json");
    let token = format!("aGVhZGVy.{payload}.c2ln");
    assert!(matches!(decode(&token), Err(DecodeError::Json(_))));
}

#[test]
fn decode_rejects_missing_or_textual_exp() {
    for body in [r#"{"sub":"x"}"#, r#"{"exp":"soon"}"#, r#"[1,2,3]"#] {
        let payload = URL_SAFE_NO_PAD.encode(body);
        let token = format!("aGVhZGVy.{payload}.c2ln");
        assert!(decode(&token).is_err(), "expected decode failure for {body}");
    }
}

fn token_with_payload(payload: &str) -> String {
    format!("aGVhZGVy.{}.c2ln", URL_SAFE_NO_PAD.encode(payload))
}

#[yare::parameterized(
    integer = { "1700000600", Some(1_700_000_600) },
    fraction_floors = { "1700000600.5", Some(1_700_000_600) },
    fraction_near_next = { "1700000600.999", Some(1_700_000_600) },
    exponent_form = { "1.7000006e9", Some(1_700_000_600) },
    negative_fraction = { "-1.5", Some(-2) },
    too_large = { "1e30", None },
)]
fn decode_numeric_exp(exp: &str, expected: Option<i64>) {
    let token = token_with_payload(&format!(r#"{{"exp":{exp},"sub":"u"}}"#));
    assert_eq!(decode(&token).ok().map(|c| c.exp), expected);
}

#[test]
fn fractional_exp_follows_the_boundary() {
    let clock = fixed_clock();
    let fresh = token_with_payload(&format!(r#"{{"exp":{}.5}}"#, NOW_MS / 1000 + 3600));
    assert!(!clock.is_expiring_soon(&fresh, THRESHOLD));

    // Floors to exactly the threshold, which renews.
    let edge = token_with_payload(&format!(r#"{{"exp":{}.9}}"#, NOW_MS / 1000 + 300));
    assert!(clock.is_expiring_soon(&edge, THRESHOLD));
}

// -- Expiry boundary -----------------------------------------------------------

#[yare::parameterized(
    already_expired = { -10, true },
    inside_window = { 299, true },
    exact_threshold_renews = { 300, true },
    just_outside = { 301, false },
    far_future = { 3600, false },
)]
fn expiring_soon_boundary(secs_from_now: i64, expected: bool) {
    let clock = fixed_clock();
    let token = mint(NOW_MS / 1000 + secs_from_now, "u");
    assert_eq!(clock.is_expiring_soon(&token, THRESHOLD), expected);
}

#[yare::parameterized(
    garbage = { "garbage" },
    two_parts = { "a.b" },
    non_json = { "aGVhZGVy.bm90IGpzb24.c2ln" },
)]
fn malformed_tokens_count_as_expiring(token: &str) {
    assert!(fixed_clock().is_expiring_soon(token, THRESHOLD));
}

#[test]
fn remaining_ms_is_negative_after_expiry() -> anyhow::Result<()> {
    let clock = fixed_clock();
    let remaining = clock.remaining_ms(&mint(NOW_MS / 1000 - 5, "u"))?;
    assert_eq!(remaining, -5000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tokio_time_source_follows_paused_clock() {
    let clock = CredentialClock::new(Arc::new(TokioTimeSource::new()));
    let token = mint(clock.now_ms() / 1000 + 600, "a1");
    assert!(!clock.is_expiring_soon(&token, THRESHOLD));

    tokio::time::advance(Duration::from_secs(350)).await;
    assert!(clock.is_expiring_soon(&token, THRESHOLD));
}
