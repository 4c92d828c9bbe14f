//! Media type helpers built on the `mime` crate.
//!
//! Handles the wildcard rules used for `@Produces`/`@Consumes` matching, structured
//! syntax suffixes (`application/vnd.acme+json` behaves like `application/json`
//! when looking up serialisers) and `Accept` header negotiation.

use crate::error::DeploymentError;
use mime::Mime;
use std::cmp::Ordering;

pub use mime::Mime as MediaType;

/// Parse a media type, dropping parameters other than the essence.
pub fn parse(value: &str) -> Result<Mime, DeploymentError> {
    value
        .trim()
        .parse::<Mime>()
        .map_err(|_| DeploymentError::InvalidMediaType(value.to_string()))
}

/// Parse a list of media types (as found in `produces`/`consumes`).
pub fn parse_all<S: AsRef<str>>(values: &[S]) -> Result<Vec<Mime>, DeploymentError> {
    values.iter().map(|v| parse(v.as_ref())).collect()
}

#[inline]
#[must_use]
pub fn is_wildcard(media: &Mime) -> bool {
    media.type_() == mime::STAR || media.subtype() == mime::STAR
}

#[must_use]
pub fn is_wildcard_type(media: &Mime) -> bool {
    media.type_() == mime::STAR
}

/// Two media types are compatible when they are equal or either side's
/// wildcard covers the other.
#[must_use]
pub fn is_compatible(a: &Mime, b: &Mime) -> bool {
    if a.type_() == mime::STAR || b.type_() == mime::STAR {
        return true;
    }
    if a.type_() != b.type_() {
        return false;
    }
    a.subtype() == mime::STAR
        || b.subtype() == mime::STAR
        || (a.subtype() == b.subtype() && a.suffix() == b.suffix())
}

/// `application/vnd.acme+json` → `application/json`.
#[must_use]
pub fn suffix_as_subtype(media: &Mime) -> Option<Mime> {
    let suffix = media.suffix()?;
    format!("{}/{}", media.type_(), suffix.as_str()).parse().ok()
}

/// Compatibility that also considers the structured syntax suffix of either side.
#[must_use]
pub fn is_compatible_with_suffix(a: &Mime, b: &Mime) -> bool {
    if is_compatible(a, b) {
        return true;
    }
    let a2 = suffix_as_subtype(a);
    let b2 = suffix_as_subtype(b);
    match (a2.as_ref(), b2.as_ref()) {
        (Some(x), _) if is_compatible(x, b) => true,
        (_, Some(y)) if is_compatible(a, y) => true,
        (Some(x), Some(y)) => is_compatible(x, y),
        _ => false,
    }
}

fn specificity(media: &Mime) -> u8 {
    if media.type_() == mime::STAR {
        0
    } else if media.subtype() == mime::STAR {
        1
    } else {
        2
    }
}

/// Orders media types most specific first.
#[must_use]
pub fn specificity_cmp(a: &Mime, b: &Mime) -> Ordering {
    specificity(b).cmp(&specificity(a))
}

/// Parse an `Accept` header into media types sorted by quality then specificity.
/// Entries with `q=0` are dropped; unparsable entries are ignored.
#[must_use]
pub fn parse_accept(header: &str) -> Vec<Mime> {
    let mut entries: Vec<(Mime, f32)> = header
        .split(',')
        .filter_map(|raw| raw.trim().parse::<Mime>().ok())
        .map(|m| {
            let q = m
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .unwrap_or(1.0);
            (m, q)
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();
    entries.sort_by(|(a, qa), (b, qb)| {
        qb.partial_cmp(qa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| specificity_cmp(a, b))
    });
    entries
        .into_iter()
        .map(|(m, _)| m.essence_str().parse().unwrap_or(m))
        .collect()
}

/// The declared `produces` list of a method, ordered for negotiation.
#[derive(Debug, Clone)]
pub struct ServerMediaType {
    sorted: Vec<Mime>,
}

impl ServerMediaType {
    /// Concrete types come before wildcards; declaration order is kept otherwise.
    #[must_use]
    pub fn new(produces: &[Mime]) -> Self {
        let mut sorted = produces.to_vec();
        sorted.sort_by(specificity_cmp);
        Self { sorted }
    }

    #[inline]
    #[must_use]
    pub fn sorted_types(&self) -> &[Mime] {
        &self.sorted
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Pick the response media type for an `Accept` header. Without a header the
    /// first declared type wins. Returns `None` when nothing is acceptable.
    #[must_use]
    pub fn negotiate(&self, accept: Option<&str>) -> Option<Mime> {
        let accepted = match accept {
            Some(header) if !header.trim().is_empty() => parse_accept(header),
            _ => return self.sorted.first().map(concrete_or_json),
        };
        if self.sorted.is_empty() {
            return accepted.into_iter().find(|m| !is_wildcard(m));
        }
        for wanted in &accepted {
            for offered in &self.sorted {
                if is_compatible_with_suffix(wanted, offered) {
                    return Some(if is_wildcard(offered) && !is_wildcard(wanted) {
                        wanted.clone()
                    } else {
                        concrete_or_json(offered)
                    });
                }
            }
        }
        None
    }
}

fn concrete_or_json(media: &Mime) -> Mime {
    if is_wildcard(media) {
        mime::APPLICATION_JSON
    } else {
        media.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatible_wildcards() {
        let json = mime::APPLICATION_JSON;
        assert!(is_compatible(&json, &mime::STAR_STAR));
        assert!(is_compatible(&"application/*".parse().unwrap(), &json));
        assert!(!is_compatible(&mime::TEXT_PLAIN, &json));
    }

    #[test]
    fn test_suffix() {
        let vnd: Mime = "application/vnd.acme+json".parse().unwrap();
        assert_eq!(suffix_as_subtype(&vnd), Some(mime::APPLICATION_JSON));
        assert!(is_compatible_with_suffix(&vnd, &mime::APPLICATION_JSON));
        assert!(suffix_as_subtype(&mime::TEXT_PLAIN).is_none());
    }

    #[test]
    fn test_parse_accept_orders_by_quality() {
        let accepted = parse_accept("text/plain;q=0.5, application/json, */*;q=0.1, image/png;q=0");
        assert_eq!(accepted.len(), 3);
        assert_eq!(accepted[0], mime::APPLICATION_JSON);
        assert_eq!(accepted[1], mime::TEXT_PLAIN);
        assert_eq!(accepted[2], mime::STAR_STAR);
    }

    #[test]
    fn test_negotiate() {
        let produces = ServerMediaType::new(&[mime::APPLICATION_JSON, mime::TEXT_PLAIN]);
        assert_eq!(produces.negotiate(None), Some(mime::APPLICATION_JSON));
        assert_eq!(produces.negotiate(Some("text/plain")), Some(mime::TEXT_PLAIN));
        assert_eq!(produces.negotiate(Some("image/png")), None);

        let any = ServerMediaType::new(&[mime::STAR_STAR]);
        assert_eq!(any.negotiate(Some("text/plain")), Some(mime::TEXT_PLAIN));
    }
}
