use crate::objects::Identity;

/// Display id of the well-known collection listing the products to build.
pub const BUILD_PRODUCTS_COLLECTION: &str = "BuildProducts";

/// Turns an arbitrary record name into a display id: every character
/// outside `[A-Za-z0-9_]` becomes `_`, and a leading digit gets a `_` prefix.
pub fn sanitize_display_id(raw: &str) -> String {
    let mut out: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        return "_".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Last path or fragment segment of an identity.
pub fn short_name(identity: &str) -> &str {
    let trimmed = identity.trim_end_matches('/');
    match trimmed.rfind(['/', '#']) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

pub fn join_identity(namespace: &str, display_id: &str) -> Identity {
    format!("{}/{}", namespace.trim_end_matches('/'), display_id)
}

/// Readable build product name `<base>_<insert>_<vector>` from the short
/// names of both template members, whether the members were declared with a
/// qualified or a bare identity. Expansion appends a hash suffix when two
/// combinations would share it.
pub fn build_product_display_id(base: &str, insert: &str, vector: &str) -> String {
    sanitize_display_id(&format!(
        "{}_{}_{}",
        base,
        short_name(insert),
        short_name(vector)
    ))
}

pub fn build_products_identity(namespace: &str) -> Identity {
    join_identity(namespace, BUILD_PRODUCTS_COLLECTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_display_id() {
        assert_eq!(sanitize_display_id("J23102-modified"), "J23102_modified");
        assert_eq!(sanitize_display_id("NM_005341.4"), "NM_005341_4");
        assert_eq!(sanitize_display_id("2micron ori"), "_2micron_ori");
        assert_eq!(sanitize_display_id("  "), "_");
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("https://synbiohub.org/public/igem/BBa_J23100"), "BBa_J23100");
        assert_eq!(short_name("http://example.org/pkg#LmrA"), "LmrA");
        assert_eq!(short_name("http://example.org/pkg/pSB1C3/"), "pSB1C3");
        assert_eq!(short_name("bare"), "bare");
    }

    #[test]
    fn test_build_product_display_id_uses_short_names() {
        let qualified = build_product_display_id(
            "Anderson_Promoters_in_vector",
            "https://synbiohub.org/public/igem/BBa_J23100",
            "https://example.org/pkg/pOpen_v4",
        );
        let bare = build_product_display_id("Anderson_Promoters_in_vector", "BBa_J23100", "pOpen_v4");
        assert_eq!(qualified, "Anderson_Promoters_in_vector_BBa_J23100_pOpen_v4");
        assert_eq!(qualified, bare);
    }

    #[test]
    fn test_join_identity_trims_separator() {
        assert_eq!(join_identity("https://x.org/pkg/", "a"), "https://x.org/pkg/a");
        assert_eq!(build_products_identity("https://x.org"), "https://x.org/BuildProducts");
    }
}
