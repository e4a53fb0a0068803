//! Request log over the `requests` namespace: append on the fallback path,
//! indexed reads, destructive positional pops.

use crate::client::ClientKey;
use crate::errors::StubError;
use crate::request::RequestRecord;
use crate::store::{Namespace, Store};

/// Relative position for fetch-and-remove. `latest` is accepted as an alias
/// of `last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
}

impl Position {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "first" => Some(Self::First),
            "last" | "latest" => Some(Self::Last),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

pub struct Recorder<'a> {
    store: &'a Store,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Append a snapshot to the log, oldest-first.
    pub fn log(&self, client: &ClientKey, record: &RequestRecord) -> Result<(), StubError> {
        self.store
            .append(client, Namespace::Requests, record.to_json()?)
    }

    pub fn count(&self, client: &ClientKey) -> Result<usize, StubError> {
        Ok(self.store.read(client, Namespace::Requests)?.len())
    }

    /// 0-based indexed read; `None` when out of range.
    pub fn read_at(
        &self,
        client: &ClientKey,
        index: usize,
    ) -> Result<Option<RequestRecord>, StubError> {
        let records = self.store.read(client, Namespace::Requests)?;
        match records.get(index) {
            Some(payload) => Ok(Some(RequestRecord::from_json(payload)?)),
            None => Ok(None),
        }
    }

    /// Remove and return the record at `position`, persisting the
    /// post-removal sequence in the same critical section.
    pub fn pop(
        &self,
        client: &ClientKey,
        position: Position,
    ) -> Result<Option<RequestRecord>, StubError> {
        self.store
            .exclusive(client, Namespace::Requests, |records| {
                let payload = match position {
                    Position::Last => records.pop(),
                    Position::First => {
                        if records.is_empty() {
                            None
                        } else {
                            Some(records.remove(0))
                        }
                    }
                };
                match payload {
                    Some(payload) => Ok(Some(RequestRecord::from_json(&payload)?)),
                    None => Ok(None),
                }
            })
    }

    pub fn clear(&self, client: &ClientKey) -> Result<(), StubError> {
        self.store.clear(client, Namespace::Requests)
    }
}
