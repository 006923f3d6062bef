//! Dependency ordering over descriptor references

use crate::descriptor::{ResourceDescriptor, ResourceRef};
use crate::error::{GlueformError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Topologically sort descriptors so every resource follows its
/// dependencies.
///
/// Among resources that are ready at the same time, lower
/// [`ResourceKind::priority`](crate::ResourceKind::priority) goes first, then
/// name. Unknown dependency references are ignored here; callers validate
/// them beforehand.
pub fn topological_order(
    descriptors: &BTreeMap<ResourceRef, ResourceDescriptor>,
) -> Result<Vec<ResourceRef>> {
    let mut remaining: BTreeMap<&ResourceRef, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&ResourceRef, Vec<&ResourceRef>> = BTreeMap::new();

    for (reference, descriptor) in descriptors {
        let deps = descriptor
            .depends_on
            .iter()
            .filter(|d| descriptors.contains_key(*d))
            .collect::<Vec<_>>();
        remaining.insert(reference, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(reference);
        }
    }

    let mut ready: BTreeSet<(u8, &ResourceRef)> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(r, _)| (r.kind.priority(), *r))
        .collect();

    let mut order = Vec::with_capacity(descriptors.len());
    while let Some(next) = ready.pop_first() {
        let (_, reference) = next;
        order.push(reference.clone());

        for dependent in dependents.get(reference).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert((dependent.kind.priority(), *dependent));
                }
            }
        }
    }

    if order.len() < descriptors.len() {
        let placed: BTreeSet<&ResourceRef> = order.iter().collect();
        let cycle = find_cycle(descriptors, &placed);
        return Err(GlueformError::dependency_cycle(cycle));
    }

    Ok(order)
}

/// Locate one cycle among the resources Kahn's algorithm could not place.
fn find_cycle(
    descriptors: &BTreeMap<ResourceRef, ResourceDescriptor>,
    placed: &BTreeSet<&ResourceRef>,
) -> Vec<String> {
    #[derive(Copy, Clone, PartialEq, Eq)]
    enum Mark {
        Temp,
        Perm,
    }

    fn dfs<'a>(
        v: &'a ResourceRef,
        descriptors: &'a BTreeMap<ResourceRef, ResourceDescriptor>,
        marks: &mut BTreeMap<&'a ResourceRef, Mark>,
        stack: &mut Vec<&'a ResourceRef>,
    ) -> Option<Vec<String>> {
        match marks.get(v) {
            Some(Mark::Perm) => return None,
            Some(Mark::Temp) => {
                // v is on the current path: the cycle is the stack suffix from v
                let start = stack.iter().position(|r| *r == v).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|r| r.to_string()).collect();
                cycle.push(v.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(v, Mark::Temp);
        stack.push(v);
        if let Some(descriptor) = descriptors.get(v) {
            for dep in &descriptor.depends_on {
                if descriptors.contains_key(dep) {
                    if let Some(cycle) = dfs(dep, descriptors, marks, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
        stack.pop();
        marks.insert(v, Mark::Perm);
        None
    }

    let mut marks = BTreeMap::new();
    for reference in descriptors.keys().filter(|r| !placed.contains(r)) {
        let mut stack = Vec::new();
        if let Some(cycle) = dfs(reference, descriptors, &mut marks, &mut stack) {
            return cycle;
        }
    }
    descriptors
        .keys()
        .filter(|r| !placed.contains(r))
        .map(|r| r.to_string())
        .collect()
}

/// Group an already ordered list into dependency levels.
///
/// Level 0 has no dependencies among `order`; every other resource sits
/// one level above its deepest dependency.
pub fn levels<'a, F, I>(order: &'a [ResourceRef], depends_on: F) -> Vec<Vec<&'a ResourceRef>>
where
    F: Fn(&ResourceRef) -> I,
    I: IntoIterator<Item = &'a ResourceRef>,
{
    let mut level_of: BTreeMap<&ResourceRef, usize> = BTreeMap::new();
    let mut levels: Vec<Vec<&ResourceRef>> = Vec::new();

    for reference in order {
        let level = depends_on(reference)
            .into_iter()
            .filter_map(|d| level_of.get(d))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);
        level_of.insert(reference, level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(reference);
    }

    levels
}
