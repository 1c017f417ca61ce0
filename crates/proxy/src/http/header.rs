use std::slice;

use smallvec::SmallVec;

/// An ordered collection of header fields.
///
/// Names are kept and matched exactly as received, with no case folding:
/// `Host` and `host` are two different fields here. Inserting a name that is
/// already present replaces the value in place, so the position of the first
/// insertion survives while the last value wins. Iteration yields fields in
/// that order, which is what keeps a re-serialized head faithful to the one
/// it was parsed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    fields: SmallVec<[(String, String); 16]>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            fields: SmallVec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter().position(|(n, _)| *n == name) {
            Some(ix) => self.fields[ix].1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Exact-case lookup of the field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter(self.fields.iter())
    }
}

pub struct Iter<'a>(slice::Iter<'a, (String, String)>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_sensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "example.com");

        assert_eq!(headers.get("Host"), Some("example.com"));
        assert_eq!(headers.get("host"), None);
        assert_eq!(headers.get("HOST"), None);
        assert!(headers.contains("Host"));
        assert!(!headers.contains("host"));
    }

    #[test]
    fn duplicate_insert_keeps_position_takes_last_value() {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", "*/*");
        headers.insert("Cookie", "a=1");
        headers.insert("Accept", "text/html");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Accept"), Some("text/html"));
        let order: Vec<_> = headers.iter().collect();
        assert_eq!(
            order,
            vec![("Accept", "text/html"), ("Cookie", "a=1")]
        );
    }

    #[test]
    fn iteration_preserves_insertion_order() {
        let mut headers = HeaderMap::new();
        for (name, value) in [("C", "3"), ("A", "1"), ("B", "2")] {
            headers.insert(name, value);
        }

        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }
}
