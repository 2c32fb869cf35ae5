use std::collections::VecDeque;

use util::IdVec;

use crate::FlowId;

/// Kahn's algorithm. Returns flow ids in dependency order, seeded and
/// tie-broken by insertion order. On a cycle, returns the ids that could not
/// be ordered so the caller can name them.
pub(crate) fn sort(
    succs: &IdVec<FlowId, Vec<FlowId>>,
    preds: &IdVec<FlowId, Vec<FlowId>>,
) -> Result<Vec<FlowId>, Vec<FlowId>> {
    let n = preds.len();
    let mut in_degree: IdVec<FlowId, usize> = IdVec::with_capacity(n);
    let mut ready = VecDeque::with_capacity(n);

    for (id, p) in preds.entries() {
        in_degree.push(p.len());
        if p.is_empty() {
            ready.push_back(id);
        }
    }

    let mut order = Vec::with_capacity(n);
    while let Some(id) = ready.pop_front() {
        order.push(id);
        for &succ in succs.get(id) {
            let degree = in_degree.get_mut(succ);
            *degree -= 1;
            if *degree == 0 {
                ready.push_back(succ);
            }
        }
    }

    if order.len() < n {
        let stuck = in_degree
            .entries()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| id)
            .collect();
        return Err(stuck);
    }
    Ok(order)
}
