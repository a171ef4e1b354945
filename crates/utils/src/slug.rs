//! URL slugs for directory listings.

/// Lower-case ASCII alphanumerics joined by single hyphens.
///
/// Non-ASCII letters are dropped rather than transliterated, so a name made
/// only of such characters produces an empty slug; callers fall back to a
/// generated one.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Returns `base` if `taken` rejects nothing, otherwise the first `base-N`
/// (N starting at 2) that `taken` does not report as used.
pub fn unique_slug<F>(base: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Acme   Staffing, Inc. "), "acme-staffing-inc");
        assert_eq!(slugify("Build--Right"), "build-right");
    }

    #[test]
    fn slugify_treats_ampersand_as_separator() {
        assert_eq!(slugify("Smith & Sons Labor"), "smith-sons-labor");
        assert_eq!(slugify("A&B Crews"), "a-b-crews");
    }

    #[test]
    fn slugify_drops_non_ascii() {
        assert_eq!(slugify("Über Crew"), "ber-crew");
        assert_eq!(slugify("ÜÖ"), "");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let used = ["acme", "acme-2"];
        assert_eq!(unique_slug("acme", |s| used.contains(&s)), "acme-3");
        assert_eq!(unique_slug("fresh", |s| used.contains(&s)), "fresh");
    }
}
