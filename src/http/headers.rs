// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Case-preserving header map

use std::ops::Index;

use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Header names and values in insertion order
///
/// Names keep the spelling they were first supplied with; lookups ignore
/// ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    /// Create an empty header map
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    fn key_of(&self, name: &str) -> Option<&String> {
        self.0.keys().find(|k| k.eq_ignore_ascii_case(name))
    }

    /// Get a header value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.key_of(name)
            .and_then(|k| self.0.get(k))
            .map(String::as_str)
    }

    /// Check whether a header is present
    pub fn contains(&self, name: &str) -> bool {
        self.key_of(name).is_some()
    }

    /// Set a header, replacing any value stored under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.key_of(&name).cloned() {
            Some(existing) => self.0.insert(existing, value),
            None => self.0.insert(name, value),
        }
    }

    /// Append a value, joining with any existing one the way XHR does
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.key_of(&name).cloned() {
            Some(existing) => {
                if let Some(current) = self.0.get_mut(&existing) {
                    current.push_str(", ");
                    current.push_str(&value);
                }
            }
            None => {
                self.0.insert(name, value);
            }
        }
    }

    /// Remove a header
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = self.key_of(name)?.clone();
        self.0.shift_remove(&key)
    }

    /// Iterate over name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into a wire header map, skipping names or values that are not valid HTTP
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in self.iter() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name),
                HeaderValue::try_from(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }

    /// Build from a wire header map; repeated names are joined
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map.iter() {
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        headers
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

impl Index<&str> for Headers {
    type Output = str;

    fn index(&self, name: &str) -> &str {
        match self.get(name) {
            Some(value) => value,
            None => panic!("header '{}' not present", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_preserved_lookup_insensitive() {
        let mut headers = Headers::new();
        headers.insert("X-Test", "v");
        assert_eq!(headers.get("x-test"), Some("v"));
        assert_eq!(&headers["X-Test"], "v");
        assert_eq!(headers.iter().next(), Some(("X-Test", "v")));
    }

    #[test]
    fn test_insert_replaces_without_renaming() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        let old = headers.insert("content-type", "application/json");
        assert_eq!(old.as_deref(), Some("text/plain"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.iter().next(), Some(("Content-Type", "application/json")));
    }

    #[test]
    fn test_append_joins_values() {
        let mut headers = Headers::new();
        headers.append("Accept", "text/html");
        headers.append("accept", "application/json");
        assert_eq!(headers.get("ACCEPT"), Some("text/html, application/json"));
    }

    #[test]
    fn test_header_map_conversion_skips_invalid() {
        let headers: Headers = [("x-ok", "1"), ("bad name", "2")].into_iter().collect();
        let map = headers.to_header_map();
        assert_eq!(map.len(), 1);
        assert_eq!(Headers::from_header_map(&map).get("X-OK"), Some("1"));
    }
}
