//! The `snapshot` strategy: depth-first through the snapshot-lineage
//! forest, root first, children visited in descending `(ogen, id)` order.

use crate::graph::SubvolumeGraph;
use crate::planner::PlannedSend;
use crate::subvolume::Subvolume;

pub fn plan<'a>(graph: &SubvolumeGraph<'a>, subvolumes: &'a [Subvolume]) -> Vec<PlannedSend<'a>> {
    let mut roots: Vec<&Subvolume> = subvolumes
        .iter()
        .filter(|sv| graph.origin(sv).is_none())
        .collect();
    roots.sort_by_key(|sv| (sv.ogen, sv.id));

    let mut out = Vec::new();
    for root in roots {
        visit(root, subvolumes, None, &mut out);
    }
    out
}

fn visit<'a>(
    node: &'a Subvolume,
    subvolumes: &'a [Subvolume],
    prev: Option<&'a Subvolume>,
    out: &mut Vec<PlannedSend<'a>>,
) {
    let mut planned = PlannedSend::new(node);
    if let Some(p) = prev {
        planned.parent = Some(p);
        planned.clone_sources = vec![p];
    }
    out.push(planned);

    let mut children: Vec<&Subvolume> = subvolumes
        .iter()
        .filter(|sv| sv.parent_uuid.as_deref() == Some(node.uuid.as_str()))
        .collect();
    children.sort_by_key(|sv| std::cmp::Reverse((sv.ogen, sv.id)));

    let mut branch_prev = node;
    for child in children {
        visit(child, subvolumes, Some(branch_prev), out);
        branch_prev = child;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subvolume::tests_support::sv;

    fn star() -> Vec<Subvolume> {
        vec![
            sv(10, 5, "r", None, 5, 5),
            sv(11, 5, "x", Some("r"), 6, 6),
            sv(12, 5, "y", Some("r"), 7, 7),
            sv(13, 5, "z", Some("r"), 8, 8),
        ]
    }

    #[test]
    fn star_topology_visits_root_then_children_descending() {
        let subvols = star();
        let graph = SubvolumeGraph::build(&subvols).unwrap();
        let plan = plan(&graph, &subvols);

        let order: Vec<u64> = plan.iter().map(|p| p.subvolume.id).collect();
        assert_eq!(order, vec![10, 13, 12, 11]);

        assert!(plan[0].parent.is_none());
        assert_eq!(plan[1].parent.unwrap().id, 10); // Z <- R
        assert_eq!(plan[2].parent.unwrap().id, 13); // Y <- Z
        assert_eq!(plan[3].parent.unwrap().id, 12); // X <- Y
    }

    #[test]
    fn parent_is_also_a_clone_source_when_present() {
        let subvols = star();
        let graph = SubvolumeGraph::build(&subvols).unwrap();
        let plan = plan(&graph, &subvols);
        for planned in &plan[1..] {
            assert_eq!(planned.clone_sources.len(), 1);
            assert_eq!(planned.clone_sources[0].id, planned.parent.unwrap().id);
        }
    }
}
