//! Resolution-order calculation for capability nodes.
//!
//! Computes a deterministic linear order over a node's ancestors with a
//! C3-style merge: at each step the first candidate head that appears in no
//! other sequence's tail is selected, so a node never sorts before one of its
//! own bases and direct-base declaration order breaks ties.
//!
//! One deliberate deviation from plain C3: after the merge, the designated
//! root node is moved to the very end of the order. Mixed ancestries can
//! otherwise leave the root interleaved in the middle, where it would outrank
//! more concrete ancestors during specificity comparisons.
//!
//! Everything here is pure over arena indices; callers supply the already
//! valid orders of the bases (bases before dependents).

use crate::graph::NodeId;

/// A failed merge: no candidate head could be selected.
///
/// Carries the heads that were each blocked by some other sequence's tail, so
/// the graph can name them in the resulting `HierarchyError`.
#[derive(Debug)]
pub(crate) struct MergeConflict {
    pub candidates: Vec<NodeId>,
}

/// Compute the resolution order for `node`.
///
/// `base_orders[i]` is the (already valid) resolution order of `bases[i]`;
/// both must be deduplicated by the caller. The returned order starts with
/// `node` and ends with `root`.
pub(crate) fn linearize(
    node: NodeId,
    base_orders: &[&[NodeId]],
    bases: &[NodeId],
    root: NodeId,
) -> Result<Vec<NodeId>, MergeConflict> {
    let mut order = if base_orders.len() == 1 {
        // Fast path: a single base makes the merge trivial.
        let mut order = Vec::with_capacity(1 + base_orders[0].len());
        order.push(node);
        order.extend_from_slice(base_orders[0]);
        order
    } else {
        let mut sequences: Vec<Vec<NodeId>> = Vec::with_capacity(base_orders.len() + 2);
        sequences.push(vec![node]);
        sequences.extend(base_orders.iter().map(|o| o.to_vec()));
        if !bases.is_empty() {
            // Declaration order of the direct bases is the tiebreak list.
            sequences.push(bases.to_vec());
        }
        merge(sequences)?
    };

    // Root-last fixup: the root sorts last no matter where the merge put it.
    order.retain(|&n| n != root);
    order.push(root);
    Ok(order)
}

/// C3 merge over the given sequences.
fn merge(mut sequences: Vec<Vec<NodeId>>) -> Result<Vec<NodeId>, MergeConflict> {
    let mut result = Vec::new();

    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }

        let mut chosen = None;
        'heads: for i in 0..sequences.len() {
            let head = sequences[i][0];
            for other in &sequences {
                if other[1..].contains(&head) {
                    // Some sequence still needs another node before this one.
                    continue 'heads;
                }
            }
            chosen = Some(head);
            break;
        }

        match chosen {
            Some(head) => {
                result.push(head);
                for s in &mut sequences {
                    if s[0] == head {
                        s.remove(0);
                    }
                }
            }
            None => {
                let mut candidates: Vec<NodeId> = Vec::new();
                for s in &sequences {
                    if !candidates.contains(&s[0]) {
                        candidates.push(s[0]);
                    }
                }
                return Err(MergeConflict { candidates });
            }
        }
    }
}
