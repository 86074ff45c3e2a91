//! Subscription registry
//!
//! Maps message type names to the set of connections subscribed to them.
//! Matching is exact string comparison.

use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};

use crate::connection::ConnectionId;

/// Type name was empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("type name must not be empty")]
pub struct EmptyTypeName;

/// Message type name
///
/// The routing key an envelope is published under. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeName(String);

impl TypeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for TypeName {
    type Error = EmptyTypeName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        TypeName::try_from(value.to_string())
    }
}

impl TryFrom<String> for TypeName {
    type Error = EmptyTypeName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(EmptyTypeName);
        }
        Ok(TypeName(value))
    }
}

impl core::ops::Deref for TypeName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TypeName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscribers of a single type
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypeEntry {
    subscribers: BTreeSet<ConnectionId>,
}

impl TypeEntry {
    pub fn add_subscriber(&mut self, connection: ConnectionId) -> bool {
        self.subscribers.insert(connection)
    }

    pub fn remove_subscriber(&mut self, connection: ConnectionId) -> bool {
        self.subscribers.remove(&connection)
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.subscribers.contains(&connection)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Type name → subscribed connections
///
/// Holds connection ids only. It never owns, closes or frees a connection;
/// the broker calls [`remove_connection`](Self::remove_connection) when it
/// tears one down. Entries whose subscriber set becomes empty are pruned, so
/// a missing entry and an empty one are indistinguishable to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    types: HashMap<TypeName, TypeEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to the subscribers of `message_type`
    ///
    /// Idempotent. Returns true if the subscription is new.
    pub fn subscribe(&mut self, connection: ConnectionId, message_type: TypeName) -> bool {
        self.types
            .entry(message_type)
            .or_default()
            .add_subscriber(connection)
    }

    /// Remove `connection` from the subscribers of `message_type`
    ///
    /// Idempotent. Returns true if a subscription was removed.
    pub fn unsubscribe(&mut self, connection: ConnectionId, message_type: &str) -> bool {
        let Some(entry) = self.types.get_mut(message_type) else {
            return false;
        };
        let removed = entry.remove_subscriber(connection);
        if entry.is_empty() {
            self.types.remove(message_type);
        }
        removed
    }

    /// Remove `connection` from every type
    ///
    /// Returns the number of subscriptions removed.
    pub fn remove_connection(&mut self, connection: ConnectionId) -> usize {
        let mut removed_count = 0;

        for entry in self.types.values_mut() {
            if entry.remove_subscriber(connection) {
                removed_count += 1;
            }
        }

        self.types.retain(|_, entry| !entry.is_empty());

        removed_count
    }

    /// Snapshot of the subscribers of `message_type`, in ascending id order
    pub fn subscribers_of(&self, message_type: &str) -> Vec<ConnectionId> {
        self.types
            .get(message_type)
            .map(|entry| entry.subscribers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, connection: ConnectionId, message_type: &str) -> bool {
        self.types
            .get(message_type)
            .is_some_and(|entry| entry.contains(connection))
    }

    /// Types with at least one subscriber
    pub fn types(&self) -> impl Iterator<Item = &TypeName> {
        self.types.keys()
    }

    pub fn topic_count(&self) -> usize {
        self.types.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.types.values().map(TypeEntry::subscriber_count).sum()
    }

    pub fn clear_all(&mut self) {
        self.types.clear();
    }
}
