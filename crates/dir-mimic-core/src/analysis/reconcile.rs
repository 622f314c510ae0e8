use super::identity::identity_key;
use crate::model::{Catalog, FileRecord, Operation};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Appended to a path to park a file while a rotation of moves completes.
const PARK_SUFFIX: &str = ".dir-mimic-swap";

/// Where one identity lives on each side, keyed by folder.
///
/// A catalog never holds two records with the same path, and the identity
/// includes the file name, so each folder maps to exactly one record.
#[derive(Default)]
struct IdentityGroup<'a> {
    source: BTreeMap<&'a str, &'a FileRecord>,
    target: BTreeMap<&'a str, &'a FileRecord>,
}

/// Compute the operations that make `target` hold every identity in exactly
/// the folders `source` requires.
///
/// Output is sorted by `from` path, then reordered only where one operation
/// has to free a path before another writes it. Repeated runs over the same
/// catalogs produce identical plans.
pub fn plan(source: &Catalog, target: &Catalog) -> Vec<Operation> {
    let mut groups: BTreeMap<String, IdentityGroup> = BTreeMap::new();

    for record in source.files() {
        groups
            .entry(identity_key(record))
            .or_default()
            .source
            .insert(record.folder(), record);
    }
    for record in target.files() {
        groups
            .entry(identity_key(record))
            .or_default()
            .target
            .insert(record.folder(), record);
    }

    let mut ops = Vec::new();
    for (key, group) in &groups {
        plan_group(key, group, &mut ops);
    }
    sort_operations(&mut ops);
    let ops = order_dependencies(ops, target);

    debug!(
        "Planned {} operations across {} identities",
        ops.len(),
        groups.len()
    );
    ops
}

fn plan_group(key: &str, group: &IdentityGroup, ops: &mut Vec<Operation>) {
    if group.target.is_empty() {
        ops.extend(group.source.values().map(|record| Operation::Missing {
            from: record.path.clone(),
            size: record.size,
        }));
        return;
    }

    if group.source.is_empty() {
        ops.extend(group.target.values().map(|record| Operation::Delete {
            from: record.path.clone(),
        }));
        return;
    }

    let only_in_source: Vec<&FileRecord> = group
        .source
        .iter()
        .filter(|(folder, _)| !group.target.contains_key(*folder))
        .map(|(_, record)| *record)
        .collect();
    let only_in_target: Vec<&FileRecord> = group
        .target
        .iter()
        .filter(|(folder, _)| !group.source.contains_key(*folder))
        .map(|(_, record)| *record)
        .collect();

    if only_in_source.is_empty() && only_in_target.is_empty() {
        return;
    }

    let move_count = only_in_source.len().min(only_in_target.len());

    for (existing, required) in only_in_target.iter().zip(only_in_source.iter()) {
        ops.push(Operation::Move {
            from: existing.path.clone(),
            to: required.path.clone(),
        });
    }

    for existing in &only_in_target[move_count..] {
        ops.push(Operation::Delete {
            from: existing.path.clone(),
        });
    }

    if only_in_source.len() > move_count {
        // Prefer a copy that stays where it is; fall back to one that is about
        // to move, which the Copy-before-Move ordering keeps readable.
        let copy_source = group
            .target
            .iter()
            .find(|(folder, _)| group.source.contains_key(*folder))
            .or_else(|| group.target.iter().next())
            .map(|(_, record)| *record);

        let Some(copy_source) = copy_source else {
            warn!("No target copy available for '{}', skipping copies", key);
            return;
        };

        for required in &only_in_source[move_count..] {
            ops.push(Operation::Copy {
                from: copy_source.path.clone(),
                to: required.path.clone(),
            });
        }
    }
}

/// Lexical by `from`; on equal `from`, copies precede moves and deletes.
pub(crate) fn sort_operations(ops: &mut [Operation]) {
    ops.sort_by(|a, b| {
        a.from_path()
            .cmp(b.from_path())
            .then_with(|| a.rank().cmp(&b.rank()))
            .then_with(|| a.to_path().cmp(&b.to_path()))
    });
}

/// Stable topological pass over sorted operations.
///
/// A write to `P` waits for the delete or move that frees `P`, and copies
/// from `P` run before it is freed. A rotation of moves is broken by parking
/// its first move under a fresh name.
fn order_dependencies(mut nodes: Vec<Operation>, target: &Catalog) -> Vec<Operation> {
    let count = nodes.len();
    let mut freed_by: BTreeMap<String, usize> = BTreeMap::new();
    let mut copies_from: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, op) in nodes.iter().enumerate() {
        match op {
            Operation::Move { from, .. } | Operation::Delete { from } => {
                freed_by.insert(from.clone(), idx);
            }
            Operation::Copy { from, .. } => copies_from.entry(from.clone()).or_default().push(idx),
            Operation::Missing { .. } => {}
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut blockers = vec![0usize; count];
    for (idx, op) in nodes.iter().enumerate() {
        if let Some(&freer) = op.to_path().and_then(|to| freed_by.get(to)) {
            dependents[freer].push(idx);
            blockers[idx] += 1;
        }
        if let Operation::Copy { from, .. } = op {
            if let Some(&freer) = freed_by.get(from.as_str()) {
                dependents[idx].push(freer);
                blockers[freer] += 1;
            }
        }
    }

    let mut taken: BTreeSet<String> = target.files().iter().map(|f| f.path.clone()).collect();
    taken.extend(nodes.iter().filter_map(|op| op.to_path().map(str::to_string)));

    let mut ready: BTreeSet<usize> = (0..count).filter(|&idx| blockers[idx] == 0).collect();
    let mut done = vec![false; count];
    let mut parked = vec![false; count];
    let mut ordered = Vec::with_capacity(count);
    let mut remaining = count;

    while remaining > 0 {
        if let Some(idx) = ready.pop_first() {
            done[idx] = true;
            remaining -= 1;
            ordered.push(nodes[idx].clone());
            for &next in &dependents[idx] {
                blockers[next] -= 1;
                if blockers[next] == 0 {
                    ready.insert(next);
                }
            }
            continue;
        }

        // Everything left waits on something else left: a rotation.
        let Some((idx, from, to)) = parkable_move(&nodes, &done, &parked, &copies_from) else {
            warn!("Could not order {} operations, keeping path order", remaining);
            ordered.extend((0..count).filter(|&idx| !done[idx]).map(|idx| nodes[idx].clone()));
            break;
        };

        let park = park_name(&from, &mut taken);
        debug!("Parking {} as {} to break a rotation", from, park);
        ordered.push(Operation::Move {
            from,
            to: park.clone(),
        });
        nodes[idx] = Operation::Move { from: park, to };
        parked[idx] = true;
        for next in std::mem::take(&mut dependents[idx]) {
            blockers[next] -= 1;
            if blockers[next] == 0 {
                ready.insert(next);
            }
        }
        if blockers[idx] == 0 {
            ready.insert(idx);
        }
    }

    ordered
}

/// First pending, not yet parked move whose source has no copies left to
/// read from it.
fn parkable_move(
    nodes: &[Operation],
    done: &[bool],
    parked: &[bool],
    copies_from: &BTreeMap<String, Vec<usize>>,
) -> Option<(usize, String, String)> {
    nodes.iter().enumerate().find_map(|(idx, op)| match op {
        Operation::Move { from, to } if !done[idx] && !parked[idx] => {
            let copies_pending = copies_from
                .get(from)
                .is_some_and(|copies| copies.iter().any(|&copy| !done[copy]));
            (!copies_pending).then(|| (idx, from.clone(), to.clone()))
        }
        _ => None,
    })
}

fn park_name(path: &str, taken: &mut BTreeSet<String>) -> String {
    let mut candidate = format!("{}{}", path, PARK_SUFFIX);
    let mut attempt = 1;
    while taken.contains(&candidate) {
        candidate = format!("{}{}-{}", path, PARK_SUFFIX, attempt);
        attempt += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Keep extra target files: drop every delete, and every move or copy whose
/// destination would stay occupied as a result. Returns `(kept, held_back)`.
pub fn retain_extras(ops: Vec<Operation>) -> (Vec<Operation>, Vec<Operation>) {
    let mut occupied: BTreeSet<String> = BTreeSet::new();
    let mut held_back: Vec<Operation> = Vec::new();
    let mut kept: Vec<Operation> = Vec::with_capacity(ops.len());

    for op in ops {
        match op {
            Operation::Delete { ref from } => {
                occupied.insert(from.clone());
                held_back.push(op);
            }
            other => kept.push(other),
        }
    }

    loop {
        let (blocked, rest): (Vec<Operation>, Vec<Operation>) = kept
            .into_iter()
            .partition(|op| op.to_path().is_some_and(|to| occupied.contains(to)));
        kept = rest;
        if blocked.is_empty() {
            break;
        }
        for op in blocked {
            if let Operation::Move { from, .. } = &op {
                occupied.insert(from.clone());
            }
            held_back.push(op);
        }
    }

    (kept, held_back)
}

/// Source records the target already holds at the same path with the same
/// identity.
pub fn unchanged_count(source: &Catalog, target: &Catalog) -> usize {
    source
        .files()
        .iter()
        .filter(|record| {
            target
                .get(&record.path)
                .is_some_and(|existing| identity_key(existing) == identity_key(record))
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_puts_copy_before_move_of_same_path() {
        let mut ops = vec![
            Operation::Move {
                from: "a/x".into(),
                to: "b/x".into(),
            },
            Operation::Delete { from: "0/y".into() },
            Operation::Copy {
                from: "a/x".into(),
                to: "d/x".into(),
            },
            Operation::Copy {
                from: "a/x".into(),
                to: "c/x".into(),
            },
        ];
        sort_operations(&mut ops);

        let kinds: Vec<(&str, Option<&str>)> =
            ops.iter().map(|op| (op.kind(), op.to_path())).collect();
        assert_eq!(
            kinds,
            vec![
                ("rm", None),
                ("cp", Some("c/x")),
                ("cp", Some("d/x")),
                ("mv", Some("b/x")),
            ]
        );
    }
}
