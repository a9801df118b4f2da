//! Route to bucket-key mapping
//!
//! The server scopes rate limits by route shape, not by the concrete ids in the
//! path, except for the major resource roots below whose id is part of the scope.

use reqwest::Method;

/// Path roots whose own id stays literal in the bucket key
const MAJOR_ROOTS: [&str; 3] = ["channels", "guilds", "webhooks"];

/// Placeholder for templated resource ids
const ID_PLACEHOLDER: &str = ":id";

/// Placeholder for reaction emoji segments
const REACTION_PLACEHOLDER: &str = ":reaction";

/// Compute the rate-limit bucket key for a request.
///
/// - Numeric id segments become `:id`, except the id directly after a major
///   root (`/channels/{id}`, `/guilds/{id}`, `/webhooks/{id}`).
/// - The segment after `reactions` (the emoji) always becomes `:reaction`.
/// - `DELETE .../messages/{id}` gets its own key prefixed with the method.
///
/// Query strings are ignored. The function is pure.
pub fn bucket_key(method: &Method, path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    // Must be decided on the raw path, templating erases the id
    let delete_message = *method == Method::DELETE && ends_with_message_id(&segments);

    let mut key = String::with_capacity(path.len() + 8);
    for (index, segment) in segments.iter().enumerate() {
        key.push('/');

        if index > 0 && segments[index - 1] == "reactions" {
            key.push_str(REACTION_PLACEHOLDER);
        } else if is_id(segment) && !is_major_parameter(&segments, index) {
            key.push_str(ID_PLACEHOLDER);
        } else {
            key.push_str(segment);
        }
    }

    if delete_message {
        format!("{} {key}", Method::DELETE)
    } else {
        key
    }
}

fn is_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn is_major_parameter(segments: &[&str], index: usize) -> bool {
    index == 1 && MAJOR_ROOTS.contains(&segments[0])
}

fn ends_with_message_id(segments: &[&str]) -> bool {
    match segments {
        [.., "messages", id] => is_id(id),
        _ => false,
    }
}
