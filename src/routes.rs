//! Route table: typed URL patterns, matching, and reverse building.
//!
//! Patterns use `<name>` for string segments and `<int:name>` for integer
//! segments: `/thing/<int:thing_id>/`. A [`RuleSet`] is built once at
//! startup (registrations chain like the router in any small framework) and
//! is read-only during request handling. Matching is a radix-tree lookup
//! via [`matchit`]; building reverses a rule's pattern by substituting
//! parameters, with surplus parameters appended as a query string.

use std::collections::HashMap;

/// Failure to reverse a URL from an endpoint name and parameters.
#[derive(Debug, thiserror::Error)]
pub enum RouteBuildError {
    #[error("no route for endpoint `{0}`")]
    UnknownEndpoint(String),

    #[error("missing parameter `{param}` building URL for `{endpoint}`")]
    MissingParam { endpoint: String, param: String },

    #[error("parameter `{param}`=`{value}` does not fit its converter for `{endpoint}`")]
    InvalidParam {
        endpoint: String,
        param: String,
        value: String,
    },
}

/// How a path segment converts between its URL text and a typed value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Converter {
    Str,
    Int,
}

impl Converter {
    fn accepts(self, value: &str) -> bool {
        match self {
            Self::Str => !value.is_empty(),
            Self::Int => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
        }
    }
}

#[derive(Clone, Debug)]
enum Piece {
    Literal(String),
    Param { name: String, converter: Converter },
}

#[derive(Clone, Debug)]
struct Rule {
    endpoint: String,
    pieces: Vec<Piece>,
}

impl Rule {
    /// Parses a pattern like `/thing/<int:thing_id>/`.
    ///
    /// # Panics
    ///
    /// Panics on a malformed pattern (unclosed `<`, unknown converter,
    /// empty parameter name). Route tables are built at startup; a bad
    /// pattern is a programming error.
    fn parse(pattern: &str, endpoint: &str) -> Self {
        let mut pieces = Vec::new();
        let mut rest = pattern;
        while let Some(open) = rest.find('<') {
            if open > 0 {
                pieces.push(Piece::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('>')
                .unwrap_or_else(|| panic!("invalid route `{pattern}`: unclosed `<`"));
            let placeholder = &after[..close];
            let (converter, name) = match placeholder.split_once(':') {
                None => (Converter::Str, placeholder),
                Some(("str", name)) => (Converter::Str, name),
                Some(("int", name)) => (Converter::Int, name),
                Some((other, _)) => {
                    panic!("invalid route `{pattern}`: unknown converter `{other}`")
                }
            };
            assert!(
                !name.is_empty(),
                "invalid route `{pattern}`: empty parameter name"
            );
            pieces.push(Piece::Param {
                name: name.to_string(),
                converter,
            });
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Literal(rest.to_string()));
        }
        Self {
            endpoint: endpoint.to_string(),
            pieces,
        }
    }

    /// The pattern in `matchit` syntax (`/thing/{thing_id}/`).
    fn matchit_pattern(&self) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Param { name, .. } => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        out
    }

    fn converter_for(&self, param: &str) -> Option<Converter> {
        self.pieces.iter().find_map(|piece| match piece {
            Piece::Param { name, converter } if name == param => Some(*converter),
            _ => None,
        })
    }
}

// ── Typed path parameters ─────────────────────────────────────────────────────

/// A path parameter value, converted per its segment's converter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
}

/// Typed path parameters extracted by a route match, passed to the handler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathArgs(HashMap<String, ParamValue>);

impl PathArgs {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// The parameter as a string, for `<name>` segments.
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.0.get(name)? {
            ParamValue::Str(s) => Some(s),
            ParamValue::Int(_) => None,
        }
    }

    /// The parameter as an integer, for `<int:name>` segments.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            ParamValue::Int(n) => Some(*n),
            ParamValue::Str(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn insert(&mut self, name: String, value: ParamValue) {
        self.0.insert(name, value);
    }
}

// ── Rule set ──────────────────────────────────────────────────────────────────

/// An ordered set of `(pattern, endpoint)` rules.
///
/// ```rust
/// use trellis::RuleSet;
///
/// let rules = RuleSet::new()
///     .rule("/thing/<int:thing_id>/", "thing")
///     .rule("/about/", "about");
///
/// assert_eq!(rules.build("thing", &[("thing_id", "4")]).unwrap(), "/thing/4/");
/// ```
#[derive(Default)]
pub struct RuleSet {
    router: matchit::Router<usize>,
    rules: Vec<Rule>,
    by_endpoint: HashMap<String, usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pattern for an endpoint. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics on a malformed pattern or one that conflicts with an
    /// already-registered pattern.
    pub fn rule(mut self, pattern: &str, endpoint: &str) -> Self {
        let rule = Rule::parse(pattern, endpoint);
        let index = self.rules.len();
        self.router
            .insert(rule.matchit_pattern(), index)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        // First-registered rule wins for URL building.
        self.by_endpoint
            .entry(rule.endpoint.clone())
            .or_insert(index);
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Matches a request path, returning the endpoint name and typed path
    /// parameters. An `<int:…>` segment that is not all digits does not
    /// match.
    pub fn recognize(&self, path: &str) -> Option<(&str, PathArgs)> {
        let matched = self.router.at(path).ok()?;
        let rule = &self.rules[*matched.value];
        let mut args = PathArgs::empty();
        for (name, value) in matched.params.iter() {
            let converter = rule.converter_for(name)?;
            if !converter.accepts(value) {
                return None;
            }
            let typed = match converter {
                Converter::Str => ParamValue::Str(value.to_string()),
                Converter::Int => ParamValue::Int(value.parse().ok()?),
            };
            args.insert(name.to_string(), typed);
        }
        Some((&rule.endpoint, args))
    }

    /// Builds a URL for an endpoint by substituting `params` into the
    /// rule's placeholders. Surplus parameters become query-string
    /// arguments.
    pub fn build(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, RouteBuildError> {
        let index = *self
            .by_endpoint
            .get(endpoint)
            .ok_or_else(|| RouteBuildError::UnknownEndpoint(endpoint.to_string()))?;
        let rule = &self.rules[index];

        let mut url = String::new();
        for piece in &rule.pieces {
            match piece {
                Piece::Literal(text) => url.push_str(text),
                Piece::Param { name, converter } => {
                    let (_, value) = params
                        .iter()
                        .find(|(k, _)| k == name)
                        .ok_or_else(|| RouteBuildError::MissingParam {
                            endpoint: endpoint.to_string(),
                            param: name.clone(),
                        })?;
                    if !converter.accepts(value) {
                        return Err(RouteBuildError::InvalidParam {
                            endpoint: endpoint.to_string(),
                            param: name.clone(),
                            value: (*value).to_string(),
                        });
                    }
                    url.push_str(value);
                }
            }
        }

        let surplus: Vec<_> = params
            .iter()
            .filter(|(k, _)| rule.converter_for(k).is_none())
            .collect();
        if !surplus.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in surplus {
                query.append_pair(k, v);
            }
            url.push('?');
            url.push_str(&query.finish());
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::new()
            .rule("/thing/<int:thing_id>/", "thing")
            .rule("/user/<name>/", "user")
            .rule("/about/", "about")
    }

    #[test]
    fn recognizes_typed_int_segment() {
        let rules = rules();
        let (endpoint, args) = rules.recognize("/thing/3/").unwrap();
        assert_eq!(endpoint, "thing");
        assert_eq!(args.int("thing_id"), Some(3));
    }

    #[test]
    fn int_segment_rejects_non_digits() {
        let rules = rules();
        assert!(rules.recognize("/thing/three/").is_none());
        assert!(rules.recognize("/thing/-3/").is_none());
    }

    #[test]
    fn recognizes_string_segment() {
        let rules = rules();
        let (endpoint, args) = rules.recognize("/user/carl/").unwrap();
        assert_eq!(endpoint, "user");
        assert_eq!(args.str("name"), Some("carl"));
    }

    #[test]
    fn unknown_path_does_not_match() {
        assert!(rules().recognize("/nope/").is_none());
    }

    #[test]
    fn builds_url_with_params() {
        assert_eq!(rules().build("thing", &[("thing_id", "4")]).unwrap(), "/thing/4/");
        assert_eq!(rules().build("about", &[]).unwrap(), "/about/");
    }

    #[test]
    fn build_surplus_params_become_query_args() {
        let url = rules()
            .build("thing", &[("thing_id", "4"), ("page", "2")])
            .unwrap();
        assert_eq!(url, "/thing/4/?page=2");
    }

    #[test]
    fn build_unknown_endpoint() {
        assert!(matches!(
            rules().build("nope", &[]),
            Err(RouteBuildError::UnknownEndpoint(_))
        ));
    }

    #[test]
    fn build_missing_param() {
        assert!(matches!(
            rules().build("thing", &[]),
            Err(RouteBuildError::MissingParam { .. })
        ));
    }

    #[test]
    fn build_mistyped_param() {
        assert!(matches!(
            rules().build("thing", &[("thing_id", "soon")]),
            Err(RouteBuildError::InvalidParam { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "unclosed")]
    fn malformed_pattern_panics() {
        let _ = RuleSet::new().rule("/thing/<int:id/", "thing");
    }

    #[test]
    #[should_panic(expected = "unknown converter")]
    fn unknown_converter_panics() {
        let _ = RuleSet::new().rule("/thing/<uuid:id>/", "thing");
    }
}
