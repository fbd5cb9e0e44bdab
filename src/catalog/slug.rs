//! Item id derivation
//!
//! Ids are slugs of the item title. Titles that collide within one batch
//! get a pointer suffix taken from the manifest URI, then a manifest digest
//! if that still clashes, so two different artifacts never share an
//! embedding cache entry.

use std::collections::HashMap;

use crate::utils::compute_sha256;

pub const MAX_SLUG_CHARS: usize = 80;

/// Lowercase, drop everything but word characters, whitespace and hyphens,
/// turn whitespace/underscore runs into one hyphen, cap at 80 chars.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| is_word_char(*c) || c.is_whitespace() || *c == '-')
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut in_run = false;
    for c in kept.trim().chars() {
        if c.is_whitespace() || c == '_' {
            if !in_run {
                slug.push('-');
                in_run = true;
            }
        } else {
            slug.push(c);
            in_run = false;
        }
    }

    slug.chars().take(MAX_SLUG_CHARS).collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Pointer suffix for a manifest URI: the last path segment that is not the
/// literal manifest file name, slugified. `p16002coll26:123/manifest.json`
/// becomes `p16002coll26-123`.
pub fn pointer_suffix(manifest_uri: &str) -> String {
    let without_query = manifest_uri.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or_default(),
        None => without_query,
    };

    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .map(str::trim)
        .find(|segment| {
            !segment.is_empty()
                && !segment.eq_ignore_ascii_case("manifest.json")
                && !segment.eq_ignore_ascii_case("manifest")
        })
        .unwrap_or_default();

    let suffix = slugify(&segment.replace([':', '.'], " "));
    if suffix.is_empty() {
        return short_digest(manifest_uri);
    }
    suffix
}

fn short_digest(value: &str) -> String {
    compute_sha256(value.as_bytes()).chars().take(8).collect()
}

fn join_with_suffix(base: &str, suffix: &str) -> String {
    let suffix: String = suffix.chars().take(MAX_SLUG_CHARS / 2).collect();
    let room = MAX_SLUG_CHARS.saturating_sub(suffix.chars().count() + 1);
    let head: String = base.chars().take(room).collect();
    let head = head.trim_end_matches('-');
    if head.is_empty() {
        suffix
    } else {
        format!("{}-{}", head, suffix)
    }
}

/// Derives one id per `(title, manifest_uri)` pair, in input order.
///
/// Plain title slugs are kept whenever they are unique in the batch, so ids
/// stay stable against existing caches. Entries with the same slug but
/// different manifests are suffixed with the manifest pointer; entries
/// sharing the manifest as well are the same artifact and keep sharing the
/// id. Any id still shared by different manifests after that (same pointer
/// on another host, or a suffixed id equal to someone's plain slug) falls
/// back to a digest of the manifest URI, lengthened until ids are unique.
pub fn assign_item_ids(entries: &[(&str, Option<&str>)]) -> Vec<String> {
    let bases: Vec<String> = entries
        .iter()
        .map(|(title, manifest)| {
            let slug = slugify(title);
            if slug.is_empty() {
                format!("item-{}", short_digest(manifest.unwrap_or(title)))
            } else {
                slug
            }
        })
        .collect();

    let mut levels: Vec<u32> = distinct_manifests(&bases, entries)
        .into_iter()
        .map(|distinct| if distinct < 2 { 0 } else { 1 })
        .collect();
    let mut ids: Vec<String> = bases
        .iter()
        .zip(entries)
        .zip(&levels)
        .map(|((base, entry), level)| render_id(base, *entry, *level))
        .collect();

    for _ in 0..MAX_DIGEST_ROUNDS {
        let clashing: Vec<usize> = distinct_manifests(&ids, entries)
            .into_iter()
            .enumerate()
            .filter(|(index, distinct)| *distinct > 1 && levels[*index] > 0)
            .map(|(index, _)| index)
            .collect();
        if clashing.is_empty() {
            break;
        }
        for index in clashing {
            levels[index] += 1;
            ids[index] = render_id(&bases[index], entries[index], levels[index]);
        }
    }
    ids
}

/// Digest suffix rounds: 8, 12, ... up to the 40-char suffix cap.
const MAX_DIGEST_ROUNDS: u32 = 9;

/// For every entry, how many distinct manifests share its key.
fn distinct_manifests(keys: &[String], entries: &[(&str, Option<&str>)]) -> Vec<usize> {
    let mut manifests_per_key: HashMap<&str, Vec<Option<&str>>> = HashMap::new();
    for (key, (_, manifest)) in keys.iter().zip(entries) {
        let seen = manifests_per_key.entry(key.as_str()).or_default();
        if !seen.contains(manifest) {
            seen.push(*manifest);
        }
    }
    keys.iter()
        .map(|key| manifests_per_key.get(key.as_str()).map_or(1, Vec::len))
        .collect()
}

/// Level 0 is the plain slug, 1 adds the manifest pointer, 2 and up add a
/// manifest digest that grows by 4 hex chars per level.
fn render_id(base: &str, (title, manifest): (&str, Option<&str>), level: u32) -> String {
    match level {
        0 => base.to_string(),
        1 => {
            let suffix = match manifest {
                Some(uri) if !uri.trim().is_empty() => pointer_suffix(uri),
                _ => short_digest(title),
            };
            join_with_suffix(base, &suffix)
        }
        _ => {
            let len = 8 + 4 * (level as usize - 2);
            let digest: String = compute_sha256(manifest.unwrap_or(title).as_bytes())
                .chars()
                .take(len)
                .collect();
            join_with_suffix(base, &digest)
        }
    }
}
