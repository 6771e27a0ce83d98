// ── Enablement and standard-resource policy ──
//
// Pure decisions over the current set of resource records. Nothing here
// writes anything; callers turn the results into backend jobs.

use crate::model::{AlarmCategory, CategorySet, CollectionAttributes, FormatCompat, ResourceId, ResourceRecord};

/// Which of `requested` may be enabled on `resource`.
///
/// Types the resource cannot hold are dropped, as are types already enabled
/// on any alias (a different resource at the same location).
pub fn compute_enablable_types<'a>(
    resource: &ResourceRecord,
    requested: CategorySet,
    all: impl IntoIterator<Item = &'a ResourceRecord>,
) -> CategorySet {
    all.into_iter()
        .filter(|other| other.aliases(resource))
        .fold(requested & resource.supported_types, |granted, alias| {
            granted - alias.enabled_types
        })
}

/// Outcome of enabling or disabling one category on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnablePlan {
    pub requested: CategorySet,
    pub granted: CategorySet,
    /// Attribute write needed to reach `granted`; empty when nothing changes.
    pub attributes: CollectionAttributes,
}

/// Plan toggling `category` on `resource`. Disabling a type also clears its
/// standard flag.
pub fn plan_enable<'a>(
    resource: &ResourceRecord,
    category: AlarmCategory,
    enable: bool,
    all: impl IntoIterator<Item = &'a ResourceRecord>,
) -> EnablePlan {
    let category = category.storage_category();
    let requested = if enable {
        resource.enabled_types.with(category)
    } else {
        resource.enabled_types.without(category)
    };
    let granted = compute_enablable_types(resource, requested, all);
    let standard = resource.standard_for & granted;

    let mut attributes = CollectionAttributes::default();
    if granted != resource.enabled_types {
        attributes.enabled_types = Some(granted);
    }
    if standard != resource.standard_for {
        attributes.standard_for = Some(standard);
    }
    EnablePlan {
        requested,
        granted,
        attributes,
    }
}

/// The writes that make `resource` the standard for some categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardPlan {
    pub resource: ResourceId,
    pub requested: CategorySet,
    /// Final standard set of the target.
    pub granted: CategorySet,
    /// Other resources losing standard flags, with their new standard sets.
    pub clears: Vec<(ResourceId, CategorySet)>,
}

impl StandardPlan {
    /// Whether executing the plan changes nothing.
    pub fn is_no_op(&self, current: &ResourceRecord) -> bool {
        self.clears.is_empty() && self.granted == current.standard_for
    }
}

/// Plan setting the standard set of `resource` to `types`.
///
/// Resources not in the current format can be standard for nothing, and a
/// resource can only be standard for types it has enabled. Every other
/// resource loses whatever standard flags the target takes.
pub fn plan_standard<'a>(
    resource: &ResourceRecord,
    types: CategorySet,
    all: impl IntoIterator<Item = &'a ResourceRecord>,
) -> StandardPlan {
    let granted = if resource.format == FormatCompat::Current {
        types & resource.enabled_types
    } else {
        CategorySet::EMPTY
    };
    let clears = all
        .into_iter()
        .filter(|other| other.id != resource.id && other.standard_for.intersects(granted))
        .map(|other| (other.id.clone(), other.standard_for - granted))
        .collect();
    StandardPlan {
        resource: resource.id.clone(),
        requested: types,
        granted,
        clears,
    }
}

/// The resource new events of `category` go to by default.
///
/// With `use_fallback`, a resource that is the only writable one enabled
/// for the category counts as standard even without the flag.
pub fn get_standard<'a, I>(category: AlarmCategory, use_fallback: bool, all: I) -> Option<ResourceId>
where
    I: IntoIterator<Item = &'a ResourceRecord>,
    I::IntoIter: Clone,
{
    let category = category.storage_category();
    let all = all.into_iter();
    if let Some(standard) = all
        .clone()
        .find(|r| r.standard_for.contains(category) && r.is_enabled_for(category))
    {
        return Some(standard.id.clone());
    }
    if !use_fallback {
        return None;
    }
    let mut writable = all.filter(|r| r.is_writable_for(category));
    match (writable.next(), writable.next()) {
        (Some(only), None) => Some(only.id.clone()),
        _ => None,
    }
}

/// A broken cross-resource invariant found in a set of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// More than one resource is standard for the category.
    DuplicateStandard {
        category: AlarmCategory,
        resources: Vec<ResourceId>,
    },
    /// Two aliases have overlapping enabled types.
    AliasOverlap {
        first: ResourceId,
        second: ResourceId,
        overlap: CategorySet,
    },
}

/// Check standard uniqueness and alias disjointness over `all`.
pub fn violations(all: &[&ResourceRecord]) -> Vec<PolicyViolation> {
    let mut found = Vec::new();
    for category in AlarmCategory::STORABLE {
        let resources: Vec<ResourceId> = all
            .iter()
            .filter(|r| r.standard_for.contains(category))
            .map(|r| r.id.clone())
            .collect();
        if resources.len() > 1 {
            found.push(PolicyViolation::DuplicateStandard {
                category,
                resources,
            });
        }
    }
    for (i, first) in all.iter().enumerate() {
        for second in &all[i + 1..] {
            let overlap = first.enabled_types & second.enabled_types;
            if first.aliases(second) && !overlap.is_empty() {
                found.push(PolicyViolation::AliasOverlap {
                    first: first.id.clone(),
                    second: second.id.clone(),
                    overlap,
                });
            }
        }
    }
    found
}
