use utils::slug::slugify;

/// Outcome of matching free-form input against a lookup table.
#[derive(Debug, Clone)]
pub struct LookupMatch<T> {
    pub matched: Vec<T>,
    pub unknown: Vec<String>,
}

/// Matches each input by slug, case-insensitive name, or the slug of the
/// input. Matched rows keep catalogue order and appear once.
pub(crate) fn resolve_lookup<T, F>(all: Vec<T>, inputs: &[String], key: F) -> LookupMatch<T>
where
    F: Fn(&T) -> (&String, &String),
{
    let mut hit = vec![false; all.len()];
    let mut unknown = Vec::new();

    for raw in inputs {
        let input = raw.trim();
        if input.is_empty() {
            continue;
        }
        let as_slug = slugify(input);
        let position = all.iter().position(|row| {
            let (name, slug) = key(row);
            name.eq_ignore_ascii_case(input) || *slug == input || *slug == as_slug
        });
        match position {
            Some(i) => hit[i] = true,
            None => unknown.push(input.to_string()),
        }
    }

    let matched = all
        .into_iter()
        .zip(hit)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect();
    LookupMatch { matched, unknown }
}
