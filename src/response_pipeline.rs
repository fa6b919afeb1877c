//! Response pipeline (§4.5): header gate → archive → challenge/rate detect
//! → hash capture, followed by the parsed-HTML stage (classify → dispatch →
//! link discovery → post-scrape milestone).

use std::collections::HashMap;

use reqwest::header::HeaderMap;
use sha2::{Digest, Sha256};

use crate::types::Source;

/// Outcome of the pre-body header gate (§4.5 "on response headers").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderGateDecision {
    Proceed,
    SkipNonHtml,
    SkipTooLarge,
}

const ACCEPTED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Evaluate the header gate before downloading the body.
pub fn header_gate(
    content_type: Option<&str>,
    content_length: Option<u64>,
    max_body_size: u64,
) -> HeaderGateDecision {
    if let Some(ct) = content_type {
        let lower = ct.to_ascii_lowercase();
        let accepted = ACCEPTED_CONTENT_TYPES
            .iter()
            .any(|a| lower == *a || lower.contains(a))
            || lower.contains("text/html");
        if !lower.is_empty() && !accepted {
            return HeaderGateDecision::SkipNonHtml;
        }
    }
    if max_body_size > 0 {
        if let Some(len) = content_length {
            if len > max_body_size {
                return HeaderGateDecision::SkipTooLarge;
            }
        }
    }
    HeaderGateDecision::Proceed
}

const CHALLENGE_PHRASES: &[&str] = &[
    "just a moment",
    "checking your browser",
    "ddos protection by cloudflare",
    "please wait...",
];

/// Detect a Cloudflare interstitial challenge (§4.5 "on body").
pub fn detect_cloudflare_challenge(headers: &HeaderMap, body_snippet: &str) -> bool {
    let has_cf_ray = headers.contains_key("cf-ray");
    let mitigated_challenge = headers
        .get("cf-mitigated")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("challenge"))
        .unwrap_or(false);
    if has_cf_ray && mitigated_challenge {
        return true;
    }

    let server_is_cloudflare = headers
        .get(reqwest::header::SERVER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("cloudflare"))
        .unwrap_or(false);

    let lower_body = body_snippet.to_ascii_lowercase();
    let has_phrase = CHALLENGE_PHRASES.iter().any(|p| lower_body.contains(p));

    has_phrase && (has_cf_ray || server_is_cloudflare)
}

pub fn is_rate_limited(status: u16) -> bool {
    status == 429
}

/// SHA-256 hex digest of a response body, used for seed start-URL tracking
/// (§3 `StartURLHash`).
pub fn sha256_hex(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Collapse a `HeaderMap` to first-value-per-key, per the §9 open question
/// ("multi-valued headers are intentionally collapsed").
pub fn first_value_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for key in headers.keys() {
        if out.contains_key(key.as_str()) {
            continue;
        }
        if let Some(value) = headers.get(key).and_then(|v| v.to_str().ok()) {
            out.insert(key.as_str().to_string(), value.to_string());
        }
    }
    out
}

/// Whether `url` should have its body hashed for start-URL tracking
/// (exact match modulo trailing slash against the source's seed URLs).
pub fn is_seed_url(source: &Source, url: &url::Url) -> bool {
    source.is_seed_url(url)
}
