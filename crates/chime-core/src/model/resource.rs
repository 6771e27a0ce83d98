// ── Calendar resource domain types ──

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::category::{AlarmCategory, CategorySet};
use super::ids::ResourceId;

// ── Rights ──────────────────────────────────────────────────────────

/// Access rights the backend grants on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rights(u8);

impl Rights {
    pub const NONE: Self = Self(0);
    pub const CAN_READ: Self = Self(0b0001);
    pub const CAN_CREATE: Self = Self(0b0010);
    pub const CAN_CHANGE: Self = Self(0b0100);
    pub const CAN_DELETE: Self = Self(0b1000);
    pub const ALL: Self = Self(0b1111);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// A resource is writable when items may be both created and changed.
    pub const fn is_writable(self) -> bool {
        self.contains(Self(Self::CAN_CREATE.0 | Self::CAN_CHANGE.0))
    }
}

impl Default for Rights {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for Rights {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── FormatCompat ────────────────────────────────────────────────────

/// Whether a resource's storage format matches the current schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FormatCompat {
    /// Not yet reported by the backend.
    #[default]
    Unknown,
    Current,
    /// Older format which can be upgraded in place.
    Convertible,
    /// Cannot be upgraded; writes needing the current format are refused.
    Incompatible,
}

// ── Colour ──────────────────────────────────────────────────────────

/// RGB background colour, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Colour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("invalid colour '{s}': expected #rrggbb"));
        }
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| format!("invalid colour '{s}': bad hex digits"))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Colour {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Colour> for String {
    fn from(c: Colour) -> Self {
        c.to_string()
    }
}

// ── ResourceRecord ──────────────────────────────────────────────────

/// One backend calendar resource and its cached attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub name: String,
    /// Canonical storage identity. Equal locations alias the same storage.
    pub location: String,
    pub supported_types: CategorySet,
    pub enabled_types: CategorySet,
    pub rights: Rights,
    #[serde(default)]
    pub format: FormatCompat,
    #[serde(default)]
    pub keep_old_format: bool,
    pub standard_for: CategorySet,
    #[serde(default)]
    pub background_colour: Option<Colour>,
}

impl ResourceRecord {
    /// A writable resource in the current format with nothing enabled.
    pub fn new(
        id: ResourceId,
        name: impl Into<String>,
        location: impl Into<String>,
        supported_types: CategorySet,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            location: location.into(),
            supported_types,
            enabled_types: CategorySet::EMPTY,
            rights: Rights::ALL,
            format: FormatCompat::Current,
            keep_old_format: false,
            standard_for: CategorySet::EMPTY,
            background_colour: None,
        }
    }

    /// Whether an event of `category` may be stored here.
    pub const fn supports(&self, category: AlarmCategory) -> bool {
        self.supported_types.contains(category.storage_category())
    }

    pub const fn is_enabled_for(&self, category: AlarmCategory) -> bool {
        self.enabled_types.contains(category.storage_category())
    }

    pub const fn is_read_only(&self) -> bool {
        !self.rights.is_writable()
    }

    /// Whether new events of `category` can be written here right now.
    pub fn is_writable_for(&self, category: AlarmCategory) -> bool {
        self.is_enabled_for(category)
            && self.rights.is_writable()
            && self.format == FormatCompat::Current
    }

    pub fn aliases(&self, other: &Self) -> bool {
        self.id != other.id && self.location == other.location
    }
}

// ── Attribute writes ────────────────────────────────────────────────

/// Resource attributes to write through the backend. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_types: Option<CategorySet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_for: Option<CategorySet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_old_format: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_colour: Option<Option<Colour>>,
}

impl CollectionAttributes {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the requested fields to a copy of a cached record.
    pub fn apply_to(&self, record: &mut ResourceRecord) {
        if let Some(ref name) = self.name {
            record.name.clone_from(name);
        }
        if let Some(enabled) = self.enabled_types {
            record.enabled_types = enabled & record.supported_types;
        }
        if let Some(standard) = self.standard_for {
            record.standard_for = standard & record.enabled_types;
        }
        if let Some(keep) = self.keep_old_format {
            record.keep_old_format = keep;
        }
        if let Some(colour) = self.background_colour {
            record.background_colour = colour;
        }
    }
}

/// Parameters for creating a new backend collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCollection {
    pub name: String,
    pub location: String,
    pub supported_types: CategorySet,
    pub enabled_types: CategorySet,
    pub standard_for: CategorySet,
    pub rights: Rights,
    pub background_colour: Option<Colour>,
}
