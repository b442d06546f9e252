//! Secondary indexes over a list-shaped snapshot.
//!
//! Indexes are derived and never persisted. Each one is tagged with the
//! snapshot generation it was built from; the owning store rebuilds when its
//! data generation moves past that tag. Positions are only candidates and
//! callers verify the record before trusting them.

use std::collections::HashMap;

use crate::record::Record;

/// Value to position maps for the well-known fields.
#[derive(Debug, Default, Clone)]
pub struct Indexes {
    generation: u64,
    id: HashMap<String, usize>,
    email: HashMap<String, usize>,
    token: HashMap<String, usize>,
    user: HashMap<String, Vec<usize>>,
}

impl Indexes {
    /// Index `records` as of `generation`.
    ///
    /// Records lacking a field are skipped for that field. For duplicate
    /// unique keys the first position wins, matching a front-to-back scan.
    pub fn build(records: &[Record], generation: u64) -> Self {
        let mut indexes = Self {
            generation,
            id: HashMap::with_capacity(records.len()),
            ..Self::default()
        };

        for (pos, record) in records.iter().enumerate() {
            if let Some(id) = record.id() {
                indexes.id.entry(id.to_string()).or_insert(pos);
            }
            if let Some(email) = record.email() {
                indexes.email.entry(email.to_string()).or_insert(pos);
            }
            if let Some(token) = record.token() {
                indexes.token.entry(token.to_string()).or_insert(pos);
            }
            if let Some(user) = record.user_id() {
                indexes.user.entry(user.to_string()).or_default().push(pos);
            }
        }
        indexes
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn id(&self, value: &str) -> Option<usize> {
        self.id.get(value).copied()
    }

    pub fn email(&self, value: &str) -> Option<usize> {
        self.email.get(value).copied()
    }

    pub fn token(&self, value: &str) -> Option<usize> {
        self.token.get(value).copied()
    }

    /// All positions for a user, in collection order.
    pub fn user(&self, value: &str) -> &[usize] {
        self.user.get(value).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Record> {
        [
            json!({ "id": "s1", "token": "t1", "userId": "u1" }),
            json!({ "id": "s2", "token": "t2", "userId": "u2" }),
            json!({ "id": "s3", "token": "t3", "userId": "u1", "email": "x@y.z" }),
            json!({ "note": "no indexed fields" }),
        ]
        .into_iter()
        .map(|v| Record::try_from(v).unwrap())
        .collect()
    }

    #[test]
    fn test_build_unique_and_multi_value() {
        let idx = Indexes::build(&records(), 7);
        assert_eq!(idx.generation(), 7);
        assert_eq!(idx.id("s2"), Some(1));
        assert_eq!(idx.token("t3"), Some(2));
        assert_eq!(idx.email("x@y.z"), Some(2));
        assert_eq!(idx.user("u1"), &[0, 2]);
        assert!(idx.user("nobody").is_empty());
        assert_eq!(idx.id("missing"), None);
    }

    #[test]
    fn test_duplicate_unique_key_first_wins() {
        let mut recs = records();
        recs.push(Record::new().with("id", "s1").with("email", "x@y.z"));
        let idx = Indexes::build(&recs, 1);
        assert_eq!(idx.id("s1"), Some(0));
        assert_eq!(idx.email("x@y.z"), Some(2));
    }
}
