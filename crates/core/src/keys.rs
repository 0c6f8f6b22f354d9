//! Object key construction for mirrored files.
//!
//! Keys are deterministic: the same origin download always maps to the same
//! blob key, which is what lets a re-mirror overwrite a stale copy in place.

/// Build the blob storage key for a mirrored file.
///
/// Layout is `mods/{remote_id}/{filename}`, with both components sanitized
/// so that origin-supplied names cannot escape the mirror prefix.
pub fn mirror_object_key(remote_id: &str, filename: &str) -> String {
    format!("mods/{}/{}", sanitize(remote_id), sanitize(filename))
}

/// Replace anything outside `[A-Za-z0-9._-]` with `_`.
///
/// All-dot components (`.`, `..`) and empty components are mapped to
/// `unnamed` so the key never contains a path traversal segment.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(
            mirror_object_key("12345", "some-mod_v1.2.zip"),
            "mods/12345/some-mod_v1.2.zip"
        );
    }

    #[test]
    fn separators_are_replaced() {
        assert_eq!(
            mirror_object_key("a/b", "weird name?.zip"),
            "mods/a_b/weird_name_.zip"
        );
    }

    #[test]
    fn traversal_components_are_neutralized() {
        assert_eq!(mirror_object_key("..", ""), "mods/unnamed/unnamed");
        assert_eq!(mirror_object_key(".", "."), "mods/unnamed/unnamed");
    }

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(
            mirror_object_key("99", "pack.bin"),
            mirror_object_key("99", "pack.bin")
        );
    }
}
