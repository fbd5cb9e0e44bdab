//! Manifest image resolution
//!
//! Manifests from different collection generations disagree on shape, so
//! resolution is an ordered list of rules, each a (predicate, extractor)
//! pair. The first rule whose predicate holds and whose extractor yields a
//! non-empty URL wins. Nothing here fails: a wrong shape is just "not found".

use serde_json::Value;

/// Canonical IIIF size/rotation/quality suffix appended to a bare image
/// service id.
pub const SERVICE_IMAGE_SUFFIX: &str = "/full/800,/0/default.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolveRule {
    /// `sequences[0].canvases[0].images[0].resource["@id"]`
    PrimaryResource,
    /// The resource's image service id plus `SERVICE_IMAGE_SUFFIX`
    ImageService,
    /// Top-level `thumbnail`, object or list
    Thumbnail,
}

impl ResolveRule {
    pub fn label(self) -> &'static str {
        match self {
            ResolveRule::PrimaryResource => "primary_resource",
            ResolveRule::ImageService => "image_service",
            ResolveRule::Thumbnail => "thumbnail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    pub rule: ResolveRule,
}

struct Rule {
    kind: ResolveRule,
    applies: fn(&Value) -> bool,
    extract: fn(&Value) -> Option<String>,
}

pub struct ManifestResolver {
    rules: Vec<Rule>,
}

impl Default for ManifestResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestResolver {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Rule {
                    kind: ResolveRule::PrimaryResource,
                    applies: has_first_resource,
                    extract: primary_resource_id,
                },
                Rule {
                    kind: ResolveRule::ImageService,
                    applies: has_first_resource,
                    extract: image_service_url,
                },
                Rule {
                    kind: ResolveRule::Thumbnail,
                    applies: has_thumbnail,
                    extract: thumbnail_id,
                },
            ],
        }
    }

    pub fn resolve(&self, manifest: &Value) -> Option<Resolution> {
        self.rules
            .iter()
            .filter(|rule| (rule.applies)(manifest))
            .find_map(|rule| {
                (rule.extract)(manifest).map(|url| Resolution {
                    url,
                    rule: rule.kind,
                })
            })
    }

    /// Resolved URL, or an empty string when no rule matched.
    pub fn resolve_url(&self, manifest: &Value) -> String {
        self.resolve(manifest)
            .map(|resolution| resolution.url)
            .unwrap_or_default()
    }
}

fn first_resource(manifest: &Value) -> Option<&Value> {
    let canvas = manifest
        .get("sequences")?
        .as_array()?
        .first()?
        .get("canvases")?
        .as_array()?
        .first()?;
    let resource = canvas
        .get("images")?
        .as_array()?
        .first()?
        .get("resource")?;
    resource.is_object().then_some(resource)
}

fn has_first_resource(manifest: &Value) -> bool {
    first_resource(manifest).is_some()
}

fn has_thumbnail(manifest: &Value) -> bool {
    manifest
        .get("thumbnail")
        .map(|thumb| !thumb.is_null())
        .unwrap_or(false)
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn primary_resource_id(manifest: &Value) -> Option<String> {
    non_empty_str(first_resource(manifest)?.get("@id"))
}

fn image_service_url(manifest: &Value) -> Option<String> {
    let service = match first_resource(manifest)?.get("service")? {
        Value::Array(services) => services.first()?,
        other => other,
    };
    let service_id = non_empty_str(service.get("@id"))?;
    Some(format!(
        "{}{}",
        service_id.trim_end_matches('/'),
        SERVICE_IMAGE_SUFFIX
    ))
}

fn thumbnail_id(manifest: &Value) -> Option<String> {
    let thumb = match manifest.get("thumbnail")? {
        Value::Array(thumbs) => thumbs.first()?,
        other => other,
    };
    match thumb {
        Value::String(_) => non_empty_str(Some(thumb)),
        Value::Object(_) => non_empty_str(thumb.get("@id")).or_else(|| non_empty_str(thumb.get("id"))),
        _ => None,
    }
}

/// Rewrites the IIIF size segment following `/full/` to `{width},`.
///
/// Only `full`, `max` and `<w>,` sizes are rewritten; anything else is
/// returned unchanged, as is a URL without a `/full/` region.
pub fn downsize_image_url(url: &str, width: u32) -> String {
    const REGION: &str = "/full/";
    let Some(region_at) = url.find(REGION) else {
        return url.to_string();
    };
    let size_start = region_at + REGION.len();
    let rest = &url[size_start..];
    let Some(size_len) = rest.find('/') else {
        return url.to_string();
    };
    let size = &rest[..size_len];

    let rewritable = size == "full"
        || size == "max"
        || size
            .strip_suffix(',')
            .map(|w| !w.is_empty() && w.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false);
    if !rewritable {
        return url.to_string();
    }

    format!("{}{},{}", &url[..size_start], width, &rest[size_len..])
}
