//! Resource lifecycle categories tracked by the task balancer.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

/// A lifecycle class pairing one producer descriptor with one consumer
/// descriptor. Declaration order is the category order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    File,
    Mount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRole {
    Producer,
    Consumer,
}

impl ResourceCategory {
    pub const ALL: [Self; 2] = [Self::File, Self::Mount];

    pub fn producer(self) -> &'static str {
        match self {
            Self::File => "open",
            Self::Mount => "mount",
        }
    }

    pub fn consumer(self) -> &'static str {
        match self {
            Self::File => "close",
            Self::Mount => "unmount",
        }
    }

    /// Category and role of a call by descriptor name.
    pub fn classify(name: &str) -> Option<(Self, LifecycleRole)> {
        Self::ALL.into_iter().find_map(|c| {
            if c.producer() == name {
                Some((c, LifecycleRole::Producer))
            } else if c.consumer() == name {
                Some((c, LifecycleRole::Consumer))
            } else {
                None
            }
        })
    }
}

/// Set of categories, iterated in category order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorySet(BTreeSet<ResourceCategory>);

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, c: ResourceCategory) -> bool {
        self.0.insert(c)
    }

    pub fn remove(&mut self, c: ResourceCategory) -> bool {
        self.0.remove(&c)
    }

    pub fn contains(&self, c: ResourceCategory) -> bool {
        self.0.contains(&c)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceCategory> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ResourceCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = ResourceCategory>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_pairs_producers_with_consumers() {
        assert_eq!(
            ResourceCategory::classify("open"),
            Some((ResourceCategory::File, LifecycleRole::Producer))
        );
        assert_eq!(
            ResourceCategory::classify("unmount"),
            Some((ResourceCategory::Mount, LifecycleRole::Consumer))
        );
        assert_eq!(ResourceCategory::classify("read"), None);
    }

    #[test]
    fn set_iterates_in_category_order() {
        let set: CategorySet = [ResourceCategory::Mount, ResourceCategory::File].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), ResourceCategory::ALL.to_vec());
    }
}
