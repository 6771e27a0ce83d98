// ── Alarm categories ──
//
// Every event belongs to exactly one category. Resources declare which of
// the storable categories they may contain as a compact `CategorySet`.

use std::fmt;
use std::ops::{BitAnd, BitOr, Sub};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlarmCategory {
    Active,
    Archived,
    Template,
    /// An active alarm currently shown by the notifier.
    Displaying,
}

impl AlarmCategory {
    /// Categories a resource can be configured to hold.
    pub const STORABLE: [Self; 3] = [Self::Active, Self::Archived, Self::Template];

    /// The resource type that stores events of this category.
    ///
    /// Displaying alarms live alongside active ones.
    pub const fn storage_category(self) -> Self {
        match self {
            Self::Displaying => Self::Active,
            other => other,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Active => 0b0001,
            Self::Archived => 0b0010,
            Self::Template => 0b0100,
            Self::Displaying => 0b1000,
        }
    }
}

// ── CategorySet ─────────────────────────────────────────────────────

/// A set of alarm categories.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<AlarmCategory>", into = "Vec<AlarmCategory>")]
pub struct CategorySet(u8);

impl CategorySet {
    pub const EMPTY: Self = Self(0);
    /// Active, archived and template.
    pub const STORABLE: Self = Self(0b0111);

    pub const fn single(category: AlarmCategory) -> Self {
        Self(category.bit())
    }

    pub const fn contains(self, category: AlarmCategory) -> bool {
        self.0 & category.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_subset(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, category: AlarmCategory) {
        self.0 |= category.bit();
    }

    pub fn remove(&mut self, category: AlarmCategory) {
        self.0 &= !category.bit();
    }

    pub const fn with(self, category: AlarmCategory) -> Self {
        Self(self.0 | category.bit())
    }

    pub const fn without(self, category: AlarmCategory) -> Self {
        Self(self.0 & !category.bit())
    }

    pub fn len(self) -> usize {
        self.iter().count()
    }

    pub fn iter(self) -> impl Iterator<Item = AlarmCategory> {
        AlarmCategory::iter().filter(move |c| self.contains(*c))
    }
}

impl BitOr for CategorySet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for CategorySet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Sub for CategorySet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0)
    }
}

impl From<AlarmCategory> for CategorySet {
    fn from(category: AlarmCategory) -> Self {
        Self::single(category)
    }
}

impl FromIterator<AlarmCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = AlarmCategory>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<Vec<AlarmCategory>> for CategorySet {
    fn from(v: Vec<AlarmCategory>) -> Self {
        v.into_iter().collect()
    }
}

impl From<CategorySet> for Vec<AlarmCategory> {
    fn from(set: CategorySet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let names: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_algebra() {
        let a = CategorySet::single(AlarmCategory::Active).with(AlarmCategory::Template);
        let b = CategorySet::single(AlarmCategory::Template);

        assert_eq!(a - b, CategorySet::single(AlarmCategory::Active));
        assert_eq!(a & b, b);
        assert!(b.is_subset(a));
        assert!(!a.is_subset(b));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn displaying_is_stored_as_active() {
        assert_eq!(
            AlarmCategory::Displaying.storage_category(),
            AlarmCategory::Active
        );
        assert!(!CategorySet::STORABLE.contains(AlarmCategory::Displaying));
    }

    #[test]
    fn serializes_as_list() {
        let set: CategorySet = [AlarmCategory::Archived, AlarmCategory::Active]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["active","archived"]"#);
        let back: CategorySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn display_lists_members() {
        assert_eq!(CategorySet::STORABLE.to_string(), "active,archived,template");
        assert_eq!(CategorySet::EMPTY.to_string(), "-");
    }
}
