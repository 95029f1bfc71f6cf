//! Capability preference ordering

use h323_wire_core::h245::capability::CapType;
use serde::{Deserialize, Serialize};

use crate::error::{CallError, Result};

pub const MAX_PREFERENCES: usize = 20;

/// Ordered codec tags used to rank offers
///
/// Holds tags only. The descriptors themselves live in the capability
/// lists; a tag with no matching descriptor is simply never selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceList {
    order: Vec<CapType>,
}

impl PreferenceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a configured order, ignoring duplicates
    pub fn from_tags(tags: &[CapType]) -> Result<Self> {
        let mut list = Self::new();
        for tag in tags {
            if !list.contains(*tag) {
                list.append(*tag)?;
            }
        }
        Ok(list)
    }

    pub fn reset(&mut self) {
        self.order.clear();
    }

    pub fn append(&mut self, cap: CapType) -> Result<()> {
        if self.contains(cap) {
            return Err(CallError::invalid_config(format!("{} already in preference list", cap)));
        }
        if self.order.len() >= MAX_PREFERENCES {
            return Err(CallError::PreferenceListFull(MAX_PREFERENCES));
        }
        self.order.push(cap);
        Ok(())
    }

    /// Put `cap` first, moving it if already present
    pub fn prepend(&mut self, cap: CapType) -> Result<()> {
        if let Some(pos) = self.index_of(cap) {
            self.order.remove(pos);
        } else if self.order.len() >= MAX_PREFERENCES {
            return Err(CallError::PreferenceListFull(MAX_PREFERENCES));
        }
        self.order.insert(0, cap);
        Ok(())
    }

    pub fn remove(&mut self, cap: CapType) -> bool {
        match self.index_of(cap) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move an existing tag to `position`, shifting the others
    pub fn change_order(&mut self, cap: CapType, position: usize) -> Result<()> {
        let current = self
            .index_of(cap)
            .ok_or_else(|| CallError::not_supported(format!("{} is not in the preference list", cap)))?;
        let target = position.min(self.order.len() - 1);
        if current != target {
            let tag = self.order.remove(current);
            self.order.insert(target, tag);
        }
        Ok(())
    }

    pub fn index_of(&self, cap: CapType) -> Option<usize> {
        self.order.iter().position(|c| *c == cap)
    }

    pub fn contains(&self, cap: CapType) -> bool {
        self.index_of(cap).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = CapType> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &PreferenceList) -> Vec<CapType> {
        list.iter().collect()
    }

    #[test]
    fn test_append_and_duplicates() {
        let mut prefs = PreferenceList::new();
        prefs.append(CapType::G729A).unwrap();
        prefs.append(CapType::G711Ulaw64k).unwrap();
        assert!(prefs.append(CapType::G729A).is_err());
        assert_eq!(tags(&prefs), vec![CapType::G729A, CapType::G711Ulaw64k]);
    }

    #[test]
    fn test_full_list() {
        let mut prefs = PreferenceList::new();
        for cap in CapType::ALL.iter().take(MAX_PREFERENCES) {
            prefs.append(*cap).unwrap();
        }
        let extra = CapType::ALL[MAX_PREFERENCES];
        assert!(matches!(prefs.append(extra), Err(CallError::PreferenceListFull(20))));
        assert!(matches!(prefs.prepend(extra), Err(CallError::PreferenceListFull(20))));
        // Prepending an existing tag never grows the list
        prefs.prepend(CapType::G711Alaw64k).unwrap();
        assert_eq!(prefs.index_of(CapType::G711Alaw64k), Some(0));
        assert_eq!(prefs.len(), MAX_PREFERENCES);
    }

    #[test]
    fn test_change_order() {
        let mut prefs =
            PreferenceList::from_tags(&[CapType::G711Ulaw64k, CapType::G711Alaw64k, CapType::G729]).unwrap();
        prefs.change_order(CapType::G711Ulaw64k, 2).unwrap();
        assert_eq!(tags(&prefs), vec![CapType::G711Alaw64k, CapType::G729, CapType::G711Ulaw64k]);
        prefs.change_order(CapType::G711Ulaw64k, 0).unwrap();
        assert_eq!(tags(&prefs), vec![CapType::G711Ulaw64k, CapType::G711Alaw64k, CapType::G729]);
        prefs.change_order(CapType::G729, 99).unwrap();
        assert_eq!(prefs.index_of(CapType::G729), Some(2));
        assert!(prefs.change_order(CapType::Speex, 0).is_err());
    }

    #[test]
    fn test_remove_and_reset() {
        let mut prefs = PreferenceList::from_tags(&[CapType::G729, CapType::G729, CapType::G7231]).unwrap();
        assert_eq!(prefs.len(), 2);
        assert!(prefs.remove(CapType::G729));
        assert!(!prefs.remove(CapType::G729));
        prefs.reset();
        assert!(prefs.is_empty());
    }
}
