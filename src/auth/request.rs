//! Pusher-style HTTP request signing.
//!
//! A request is authorized when its `auth_signature` query parameter matches
//! the HMAC-SHA256 hex digest of `METHOD\nPATH\nORDERED_PARAMS` under the
//! app secret, where the params are sorted lexicographically by key.

use std::collections::BTreeMap;

use md5::{Digest, Md5};

use crate::apps::App;

use super::token;

/// Parameters never included in the canonical string: the signature itself,
/// the client-supplied body hash, and routing parameters.
const STRIPPED_PARAMS: [&str; 5] = [
    "auth_signature",
    "body_md5",
    "appId",
    "appKey",
    "channelName",
];

/// Compute the expected signature for a request.
///
/// `params` holds the merged query and route parameters. When the request
/// carries a JSON body, its raw bytes are passed so a `body_md5` param can be
/// recomputed server-side rather than trusted from the client.
pub fn expected_signature(
    app: &App,
    method: &str,
    path: &str,
    params: &BTreeMap<String, String>,
    raw_body: Option<&str>,
) -> String {
    let mut ordered: BTreeMap<&str, &str> = params
        .iter()
        .filter(|(k, _)| !STRIPPED_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let body_md5 = raw_body.filter(|b| !b.is_empty()).map(md5_hex);
    if let Some(md5) = &body_md5 {
        ordered.insert("body_md5", md5);
    }

    let ordered_params = ordered
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let canonical = format!("{}\n{}\n{}", method.to_uppercase(), path, ordered_params);

    token::sign(&app.secret, &canonical)
}

/// Verify the `auth_signature` on a request. Missing signature or mismatch
/// both refuse authorization; neither is an error.
pub fn verify(
    app: &App,
    method: &str,
    path: &str,
    params: &BTreeMap<String, String>,
    raw_body: Option<&str>,
) -> bool {
    let Some(candidate) = params.get("auth_signature") else {
        return false;
    };

    *candidate == expected_signature(app, method, path, params, raw_body)
}

fn md5_hex(body: &str) -> String {
    token::hex_digest(&Md5::digest(body.as_bytes()))
}
