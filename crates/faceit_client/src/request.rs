// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

use reqwest::Url;

/// Stands in for the configured base URL when rendering a request on its own.
const KEY_BASE: &str = "http://faceit.invalid/";

/// A GET request against the Data API, relative to the configured base URL.
///
/// The [`Display`] form (`/players/abc/stats/cs2?offset=0`) is the path and query exactly as
/// they go on the wire, percent-encoded, and doubles as the cache key. Two requests share
/// cached answers only when they address the same URL, so a segment holding `/` or a query
/// value holding `&` cannot be mistaken for a different resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiRequest {
    segments: Vec<String>,
    query: Vec<(&'static str, String)>,
}

impl ApiRequest {
    /// A request for the path made of `segments`, each percent-encoded as needed on the wire.
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    /// The path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The query parameters, in insertion order.
    #[must_use]
    pub fn query_pairs(&self) -> &[(&'static str, String)] {
        &self.query
    }

    /// Appends the encoded segments and query to `url`. Fails if `url` cannot carry a path.
    pub(crate) fn append_to(&self, url: &mut Url) -> Result<(), ()> {
        url.path_segments_mut()?.pop_if_empty().extend(&self.segments);
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(())
    }
}

impl Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut url = Url::parse(KEY_BASE).map_err(|_invalid| fmt::Error)?;
        self.append_to(&mut url).map_err(|()| fmt::Error)?;
        f.write_str(url.path())?;
        if let Some(query) = url.query() {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_segments_and_query() {
        let request = ApiRequest::new(["players", "abc-123", "history"])
            .query("game", "cs2")
            .query("offset", "20");

        assert_eq!(request.to_string(), "/players/abc-123/history?game=cs2&offset=20");
    }

    #[test]
    fn display_without_query() {
        assert_eq!(ApiRequest::new(["matches", "1-xyz"]).to_string(), "/matches/1-xyz");
    }

    #[test]
    fn display_encodes_like_the_wire() {
        let nested = ApiRequest::new(["players", "abc/stats/cs2"]);
        let stats = ApiRequest::new(["players", "abc", "stats", "cs2"]);
        assert_eq!(nested.to_string(), "/players/abc%2Fstats%2Fcs2");
        assert_ne!(nested.to_string(), stats.to_string());

        let request = ApiRequest::new(["players"]).query("nickname", "a&game=csgo");
        assert_eq!(request.to_string(), "/players?nickname=a%26game%3Dcsgo");
    }
}
