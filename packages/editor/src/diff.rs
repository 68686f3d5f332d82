//! # Diff Engine
//!
//! Computes the edit actions that turn one tree into another.
//!
//! ## Pairing
//!
//! Children of two matched nodes are paired in two passes:
//! 1. Same identity and same kind
//! 2. Greedy similarity for the rest: each unpaired old child (in order)
//!    takes the unpaired comparable new child with the lowest
//!    [`Node::count_shallow_diffs`] cost, ties broken by positional distance
//!    and then by the lower new index
//!
//! Only nodes whose identity is unknown to the other tree take part in the
//! similarity pass. A node whose id survives anywhere in the new tree is
//! either paired with that node or removed and re-inserted where it ends up.
//!
//! ## Output order
//!
//! Per child list: removals (highest index first), then moves, then inserts
//! (ascending final index). Paired children are diffed recursively after
//! their parent's list. Across the whole tree every insert is emitted after
//! every removal and move, so a node moved between parents is removed before
//! it is re-inserted.
//!
//! Value changes are emitted as Set actions addressed at the old node's
//! identity, so the diff applies to the old tree.

use crate::actions::EditAction;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tandem_model::{Node, NodeTag};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffError {
    #[error("Cannot diff {old} against {new}")]
    NotDiffable { old: NodeTag, new: NodeTag },
}

/// Counts of each action kind in a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub sets: usize,
    pub inserts: usize,
    pub removes: usize,
    pub moves: usize,
}

impl DiffStats {
    pub fn from_actions(actions: &[EditAction]) -> Self {
        let mut stats = DiffStats::default();
        for action in actions {
            match action {
                EditAction::Set { .. } => stats.sets += 1,
                EditAction::InsertChild { .. } => stats.inserts += 1,
                EditAction::RemoveChild { .. } => stats.removes += 1,
                EditAction::MoveChild { .. } => stats.moves += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.sets + self.inserts + self.removes + self.moves
    }
}

/// Actions that transform `old` into `new`.
///
/// Identical instances yield an empty diff. Nodes of different kinds are not
/// diffable; the caller replaces the whole node instead (see [`replace`]).
pub fn diff(old: &Node, new: &Node) -> Result<Vec<EditAction>, DiffError> {
    if std::ptr::eq(old, new) {
        return Ok(Vec::new());
    }

    if old.tag() != new.tag() {
        return Err(DiffError::NotDiffable {
            old: old.tag(),
            new: new.tag(),
        });
    }

    let mut differ = Differ::new(old, new);
    differ.diff_node(old, new);

    let mut actions = differ.structural;
    actions.extend(differ.inserts);

    let stats = DiffStats::from_actions(&actions);
    debug!(
        node_id = %old.id,
        sets = stats.sets,
        inserts = stats.inserts,
        removes = stats.removes,
        moves = stats.moves,
        "Computed diff"
    );

    Ok(actions)
}

/// Whole-node replacement at `index` of `parent_id`
pub fn replace(parent_id: &str, index: usize, old: &Node, new: Node) -> Vec<EditAction> {
    vec![
        EditAction::RemoveChild {
            parent: parent_id.to_string(),
            index,
            child_id: old.id.clone(),
            removed: Some(old.clone()),
        },
        EditAction::InsertChild {
            parent: parent_id.to_string(),
            index,
            child: new,
        },
    ]
}

struct Differ {
    identities: Identities,
    /// Sets, removals and moves in traversal order
    structural: Vec<EditAction>,
    inserts: Vec<EditAction>,
}

/// Every id of the old and the new tree
struct Identities {
    old: HashSet<String>,
    new: HashSet<String>,
}

impl Identities {
    fn of(old: &Node, new: &Node) -> Self {
        Self {
            old: old.descendant_ids().into_iter().collect(),
            new: new.descendant_ids().into_iter().collect(),
        }
    }
}

impl Differ {
    fn new(old: &Node, new: &Node) -> Self {
        Self {
            identities: Identities::of(old, new),
            structural: Vec::new(),
            inserts: Vec::new(),
        }
    }

    fn diff_node(&mut self, old: &Node, new: &Node) {
        if std::ptr::eq(old, new) {
            return;
        }
        self.diff_values(old, new);
        self.diff_children(old, new);
    }

    fn diff_values(&mut self, old: &Node, new: &Node) {
        let ours = old.values();
        let theirs = new.values();
        let keys: BTreeSet<_> = ours.keys().chain(theirs.keys()).collect();

        for key in keys {
            let previous = ours.get(key);
            let value = theirs.get(key);
            if previous != value {
                self.structural.push(EditAction::Set {
                    target: old.id.clone(),
                    key: key.clone(),
                    value: value.cloned(),
                    previous: previous.cloned(),
                });
            }
        }
    }

    fn diff_children(&mut self, old: &Node, new: &Node) {
        let pairs = pair_children(&old.children, &new.children, &self.identities);

        let mut paired_old = vec![false; old.children.len()];
        for old_index in pairs.iter().flatten() {
            paired_old[*old_index] = true;
        }

        for (index, child) in old.children.iter().enumerate().rev() {
            if !paired_old[index] {
                self.structural.push(EditAction::RemoveChild {
                    parent: old.id.clone(),
                    index,
                    child_id: child.id.clone(),
                    removed: Some(Node::clone(child)),
                });
            }
        }

        // surviving children in old order, and in the order they end up
        let mut working: Vec<usize> = (0..old.children.len()).filter(|i| paired_old[*i]).collect();
        let target: Vec<usize> = pairs.iter().flatten().copied().collect();

        let rank: HashMap<usize, usize> = target.iter().enumerate().map(|(rank, &o)| (o, rank)).collect();
        let ranks: Vec<usize> = working.iter().map(|o| rank[o]).collect();
        let stable: BTreeSet<usize> = longest_increasing_subsequence(&ranks)
            .into_iter()
            .map(|k| working[k])
            .collect();

        for (position, &old_index) in target.iter().enumerate() {
            if stable.contains(&old_index) {
                continue;
            }
            let Some(from) = working.iter().position(|&o| o == old_index) else {
                continue;
            };
            working.remove(from);

            // right after the child that precedes it in the new order
            let to = match position.checked_sub(1) {
                Some(prev) => working
                    .iter()
                    .position(|&o| o == target[prev])
                    .map_or(0, |p| p + 1),
                None => 0,
            };
            working.insert(to, old_index);

            if from != to {
                self.structural.push(EditAction::MoveChild {
                    parent: old.id.clone(),
                    child_id: old.children[old_index].id.clone(),
                    from,
                    to,
                });
            }
        }

        for (index, pair) in pairs.iter().enumerate() {
            if pair.is_none() {
                self.inserts.push(EditAction::InsertChild {
                    parent: old.id.clone(),
                    index,
                    child: Node::clone(&new.children[index]),
                });
            }
        }

        for (new_index, pair) in pairs.iter().enumerate() {
            if let Some(old_index) = pair {
                self.diff_node(&old.children[*old_index], &new.children[new_index]);
            }
        }
    }
}

/// For each new child, the index of the old child it is paired with
fn pair_children(old: &[Arc<Node>], new: &[Arc<Node>], identities: &Identities) -> Vec<Option<usize>> {
    let mut new_to_old: Vec<Option<usize>> = vec![None; new.len()];
    let mut old_paired = vec![false; old.len()];

    let by_id: HashMap<&str, usize> = new
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id.as_str(), index))
        .collect();

    for (old_index, child) in old.iter().enumerate() {
        if let Some(&new_index) = by_id.get(child.id.as_str()) {
            if new_to_old[new_index].is_none() && child.tag() == new[new_index].tag() {
                new_to_old[new_index] = Some(old_index);
                old_paired[old_index] = true;
            }
        }
    }

    for (old_index, child) in old.iter().enumerate() {
        if old_paired[old_index] || identities.new.contains(&child.id) {
            continue;
        }

        let mut best: Option<(i32, usize, usize)> = None;
        for (new_index, candidate) in new.iter().enumerate() {
            if new_to_old[new_index].is_some() || identities.old.contains(&candidate.id) {
                continue;
            }
            let cost = child.count_shallow_diffs(candidate);
            if cost < 0 {
                continue;
            }
            let score = (cost, old_index.abs_diff(new_index), new_index);
            if best.map_or(true, |b| score < b) {
                best = Some(score);
            }
        }

        if let Some((_, _, new_index)) = best {
            new_to_old[new_index] = Some(old_index);
            old_paired[old_index] = true;
        }
    }

    new_to_old
}

/// Positions (into `seq`) of one longest strictly increasing subsequence
fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    // tails[len] = position of the smallest tail of an increasing run of len+1
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessors: Vec<Option<usize>> = vec![None; seq.len()];

    for (position, &value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < value);
        predecessors[position] = slot.checked_sub(1).map(|s| tails[s]);
        if slot == tails.len() {
            tails.push(position);
        } else {
            tails[slot] = position;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        result.push(position);
        cursor = predecessors[position];
    }
    result.reverse();
    result
}
