use std::time::Duration;

use spotmeta::types::{ArtistRef, Image};
use spotmeta::utils::*;

fn artist(id: &str, name: &str) -> ArtistRef {
    ArtistRef {
        id: id.to_string(),
        name: name.to_string(),
    }
}

#[test]
fn test_generate_code_verifier() {
    let verifier = generate_code_verifier();

    // Should be exactly 128 characters
    assert_eq!(verifier.len(), 128);

    // Should contain only alphanumeric characters
    assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));

    // Two generated verifiers should be different
    let verifier2 = generate_code_verifier();
    assert_ne!(verifier, verifier2);
}

#[test]
fn test_generate_code_challenge() {
    let verifier = "test_verifier_123";
    let challenge = generate_code_challenge(verifier);

    // Should not be empty
    assert!(!challenge.is_empty());

    // Should be deterministic - same input produces same output
    let challenge2 = generate_code_challenge(verifier);
    assert_eq!(challenge, challenge2);

    // Different input should produce different output
    let challenge3 = generate_code_challenge("different_verifier");
    assert_ne!(challenge, challenge3);

    // Should be base64-encoded (URL-safe, no padding)
    assert!(
        challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    );
}

#[test]
fn test_generate_code_challenge_rfc7636_vector() {
    // Appendix B of RFC 7636
    let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
    assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
}

#[test]
fn test_random_url_safe() {
    let a = random_url_safe(32);
    let b = random_url_safe(32);

    // 32 bytes encode to 43 unpadded characters
    assert_eq!(a.len(), 43);
    assert_ne!(a, b);
    assert!(!a.contains('='));
}

#[test]
fn test_random_user_agent() {
    let ua = random_user_agent();
    assert!(ua.starts_with("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_"));
    assert!(ua.contains("Chrome/"));
}

#[test]
fn test_parse_retry_after() {
    let default = Duration::from_secs(5);

    // One second is added to the advertised value
    assert_eq!(parse_retry_after(Some("5"), default), Duration::from_secs(6));
    assert_eq!(parse_retry_after(Some(" 0 "), default), Duration::from_secs(1));

    // Missing or unparsable headers fall back to the default
    assert_eq!(parse_retry_after(None, default), default);
    assert_eq!(parse_retry_after(Some("soon"), default), default);
    assert_eq!(
        parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT"), default),
        default
    );
}

#[test]
fn test_preview_body() {
    // Whitespace is collapsed
    assert_eq!(preview_body(b"{\n  \"error\":  \"x\"\n}", 100), "{ \"error\": \"x\" }");

    // Long bodies are truncated with an ellipsis
    assert_eq!(preview_body(b"abcdefghij", 4), "abcd…");

    // Empty input or zero budget yields nothing
    assert_eq!(preview_body(b"", 10), "");
    assert_eq!(preview_body(b"abc", 0), "");
}

#[test]
fn test_redact_token_url() {
    let url = "https://open.spotify.com/api/token?reason=init&totp=123456&totpVer=61";
    let redacted = redact_token_url(url);
    assert!(!redacted.contains("123456"));
    assert!(redacted.contains("totp=***") || redacted.contains("totp=%2A%2A%2A"));
    assert!(redacted.contains("totpVer=61"));

    // URLs without a code are left alone
    let plain = "https://open.spotify.com/get_access_token?reason=transport";
    assert_eq!(redact_token_url(plain), plain);
}

#[test]
fn test_host_of() {
    assert_eq!(host_of("https://API.spotify.com/v1/tracks/x"), "api.spotify.com");
    assert_eq!(host_of("http://127.0.0.1:8080/v1"), "127.0.0.1:8080");
    assert_eq!(host_of("not a url"), "");
}

#[test]
fn test_strip_locale_param() {
    // The locale parameter is dropped, others are kept
    let next = strip_locale_param(Some(
        "https://api.spotify.com/v1/albums/x/tracks?offset=50&limit=50&locale=de-DE",
    ))
    .unwrap();
    assert!(!next.contains("locale"));
    assert!(next.contains("offset=50"));
    assert!(next.contains("limit=50"));

    // A query consisting only of locale disappears entirely
    let next = strip_locale_param(Some("https://api.spotify.com/v1/x?locale=en")).unwrap();
    assert_eq!(next, "https://api.spotify.com/v1/x");

    // Links without locale are returned unchanged
    let raw = "https://api.spotify.com/v1/x?offset=100&limit=100";
    assert_eq!(strip_locale_param(Some(raw)).as_deref(), Some(raw));

    // Empty or missing links end the walk
    assert_eq!(strip_locale_param(None), None);
    assert_eq!(strip_locale_param(Some("  ")), None);
}

#[test]
fn test_join_artists() {
    let artists = vec![artist("a", "Daft Punk"), artist("b", ""), artist("c", "Pharrell")];
    assert_eq!(join_artists(&artists), "Daft Punk, Pharrell");
    assert_eq!(join_artists(&[]), "");
}

#[test]
fn test_first_image_url() {
    let images = vec![
        Image {
            url: "https://i.scdn.co/image/large".to_string(),
        },
        Image {
            url: "https://i.scdn.co/image/small".to_string(),
        },
    ];
    assert_eq!(first_image_url(&images), "https://i.scdn.co/image/large");
    assert_eq!(first_image_url(&[]), "");
}

#[test]
fn test_primary_artist_and_artists_data() {
    let artists = vec![artist("4tZwfgrHOc3mvqYlEYSvVi", "Daft Punk")];

    let (id, url) = primary_artist(&artists);
    assert_eq!(id, "4tZwfgrHOc3mvqYlEYSvVi");
    assert_eq!(url, "https://open.spotify.com/artist/4tZwfgrHOc3mvqYlEYSvVi");

    let data = artists_data(&artists);
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].name, "Daft Punk");
    assert_eq!(data[0].external_urls, url);

    assert_eq!(primary_artist(&[]), (String::new(), String::new()));
}

#[test]
fn test_first_non_empty() {
    assert_eq!(first_non_empty(&["", "  ", "b", "c"]), "b");
    assert_eq!(first_non_empty(&["", ""]), "");
}
