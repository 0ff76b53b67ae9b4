//! Joins base and relative paths and fills in `{name}` placeholders.

use crate::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(.*?)\}").expect("placeholder pattern is valid")
});

/// Resolves `base_path` + `path` into a request URL.
///
/// The trailing slash of `base_path` and the leading slash of `path` are
/// dropped and the two are joined with a single `/`. Every `{name}` token is
/// then replaced with `path_params[name]`.
///
/// # Errors
///
/// Returns [`Error::MissingPathParameter`] for the first placeholder with no
/// matching parameter.
///
/// # Examples
///
/// ```
/// use duplex::path::build_url;
/// use std::collections::HashMap;
///
/// let params = HashMap::from([("userId".to_string(), "7".to_string())]);
/// let url = build_url("https://api.example.com/", "/v1/{userId}/posts", &params).unwrap();
/// assert_eq!(url, "https://api.example.com/v1/7/posts");
/// ```
pub fn build_url(
    base_path: &str,
    path: &str,
    path_params: &HashMap<String, String>,
) -> Result<String> {
    let base = base_path.strip_suffix('/').unwrap_or(base_path);
    let relative = path.strip_prefix('/').unwrap_or(path);
    let joined = if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, relative)
    };

    let mut url = joined.clone();
    for captures in PLACEHOLDER.captures_iter(&joined) {
        let token = &captures[0];
        let name = &captures[1];
        let value = path_params
            .get(name)
            .ok_or_else(|| Error::MissingPathParameter {
                url: joined.clone(),
                param: name.to_string(),
            })?;
        url = url.replacen(token, value, 1);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_joins_with_single_slash() {
        let empty = HashMap::new();
        assert_eq!(build_url("http://a.io/", "/b", &empty).unwrap(), "http://a.io/b");
        assert_eq!(build_url("http://a.io", "b", &empty).unwrap(), "http://a.io/b");
        assert_eq!(build_url("http://a.io/", "b", &empty).unwrap(), "http://a.io/b");
        assert_eq!(build_url("http://a.io", "", &empty).unwrap(), "http://a.io");
    }

    #[test]
    fn test_substitutes_every_placeholder() {
        let url = build_url(
            "https://gorest.co.in/public",
            "/v1/users/{userId}/posts/{postId}",
            &params(&[("userId", "12"), ("postId", "abc")]),
        )
        .unwrap();
        assert_eq!(url, "https://gorest.co.in/public/v1/users/12/posts/abc");
    }

    #[test]
    fn test_repeated_placeholder() {
        let url = build_url("http://a.io", "{id}/{id}", &params(&[("id", "1")])).unwrap();
        assert_eq!(url, "http://a.io/1/1");
    }

    #[test]
    fn test_placeholder_in_base_path() {
        let url = build_url("http://{host}.io", "x", &params(&[("host", "api")])).unwrap();
        assert_eq!(url, "http://api.io/x");
    }

    #[test]
    fn test_missing_parameter() {
        let result = build_url("http://a.io", "/v1/{userId}/posts", &params(&[("other", "1")]));
        match result {
            Err(Error::MissingPathParameter { url, param }) => {
                assert_eq!(url, "http://a.io/v1/{userId}/posts");
                assert_eq!(param, "userId");
            }
            other => panic!("Expected MissingPathParameter, got {:?}", other),
        }
    }
}
