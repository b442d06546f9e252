//! Query predicates.
//!
//! A [`Query`] is a conjunction of per-field predicates. Each predicate is
//! either literal JSON equality or an arbitrary one-argument matcher. Queries
//! made only of literal string equality on the well-known fields can be
//! answered from an index; [`Query::lookup`] says which one.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::record::{fields, Record};

type Matcher = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Condition on a single field.
#[derive(Clone)]
pub enum Predicate {
    /// Field equals this JSON value.
    Eq(Value),
    /// Matcher receives the field value (`None` when absent).
    Matches(Matcher),
}

impl Predicate {
    pub fn test(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => value == Some(expected),
            Self::Matches(f) => f(value),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::Eq(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(v) => write!(f, "Eq({v})"),
            Self::Matches(_) => f.write_str("Matches(..)"),
        }
    }
}

/// How a query can be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(&'a str),
    Email(&'a str),
    Token(&'a str),
    User(&'a str),
    TokenAndUser(&'a str, &'a str),
    Scan,
}

/// Conjunction of field predicates.
#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<(String, Predicate)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses
            .push((field.into(), Predicate::Eq(value.into())));
        self
    }

    #[must_use]
    pub fn matches<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.clauses
            .push((field.into(), Predicate::Matches(Arc::new(f))));
        self
    }

    pub fn by_id(id: &str) -> Self {
        Self::new().eq(fields::ID, id)
    }

    pub fn by_email(email: &str) -> Self {
        Self::new().eq(fields::EMAIL, email)
    }

    pub fn by_token(token: &str) -> Self {
        Self::new().eq(fields::TOKEN, token)
    }

    pub fn by_user(user_id: &str) -> Self {
        Self::new().eq(fields::USER_ID, user_id)
    }

    pub fn clauses(&self) -> &[(String, Predicate)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when every predicate holds for `record`.
    pub fn matches_record(&self, record: &Record) -> bool {
        self.clauses
            .iter()
            .all(|(field, pred)| pred.test(record.get(field)))
    }

    /// Classify the query for index acceleration.
    pub fn lookup(&self) -> Lookup<'_> {
        match self.clauses.as_slice() {
            [(field, pred)] => match pred.as_str() {
                Some(v) if field == fields::ID => Lookup::Id(v),
                Some(v) if field == fields::EMAIL => Lookup::Email(v),
                Some(v) if field == fields::TOKEN => Lookup::Token(v),
                Some(v) if field == fields::USER_ID => Lookup::User(v),
                _ => Lookup::Scan,
            },
            [(a, pa), (b, pb)] => match (a.as_str(), pa.as_str(), b.as_str(), pb.as_str()) {
                (fields::TOKEN, Some(t), fields::USER_ID, Some(u))
                | (fields::USER_ID, Some(u), fields::TOKEN, Some(t)) => {
                    Lookup::TokenAndUser(t, u)
                }
                _ => Lookup::Scan,
            },
            _ => Lookup::Scan,
        }
    }
}
