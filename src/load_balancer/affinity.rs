//! Session id extraction for sticky routing.
//!
//! A session id has the form `<opaque>.<backend>`; several ids may be joined
//! with `;`. The path parameter wins over the cookie.

use axum::http::{header::COOKIE, HeaderMap};

use crate::transport::ProxyRequest;

/// Path parameter carrying the session id, including its leading separator.
pub const SESSION_PATH_PARAM: &str = ";jsessionid";

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Session id of the request, path parameter first, then cookies.
pub(crate) fn session_id(request: &ProxyRequest) -> Option<String> {
    path_param(request.uri.path(), SESSION_PATH_PARAM)
        .or_else(|| cookie(&request.headers, SESSION_COOKIE))
}

fn path_param(path: &str, name: &str) -> Option<String> {
    for (pos, _) in path.match_indices(name) {
        let Some(value) = path[pos + name.len()..].strip_prefix('=') else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let end = value.find(['?', ';']).unwrap_or(value.len());
        return Some(value[..end].to_string());
    }
    None
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let mut values: Vec<String> = Vec::new();

    for header in headers.get_all(COOKIE) {
        // Other cookies may carry raw non-ASCII bytes.
        let header = String::from_utf8_lossy(header.as_bytes());
        for (pos, _) in header.match_indices(name) {
            let at_boundary = header[..pos]
                .chars()
                .next_back()
                .map_or(true, |c| c == ';' || c == ',' || c.is_ascii_whitespace());
            if !at_boundary {
                continue;
            }

            let rest = header[pos + name.len()..].trim_start_matches(|c: char| c.is_ascii_whitespace());
            let Some(value) = rest.strip_prefix('=') else {
                continue;
            };
            let end = value.find([';', ',']).unwrap_or(value.len());
            if end == 0 {
                continue;
            }
            values.push(value[..end].to_string());
        }
    }

    if values.is_empty() {
        None
    } else {
        Some(values.join(";"))
    }
}
