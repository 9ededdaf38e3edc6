//! The `parent` strategy: order by `(ogen, id)`, parent and clone sources
//! come straight from the ancestor chain.

use crate::graph::SubvolumeGraph;
use crate::planner::PlannedSend;
use crate::subvolume::Subvolume;

/// For each subvolume (ascending `(ogen, id)`), the parent is its nearest
/// snapshot origin in the working set and the clone sources are the full
/// ancestor chain.
pub fn plan<'a>(graph: &SubvolumeGraph<'a>, subvolumes: &'a [Subvolume]) -> Vec<PlannedSend<'a>> {
    let mut ordered: Vec<&Subvolume> = subvolumes.iter().collect();
    ordered.sort_by_key(|sv| (sv.ogen, sv.id));

    ordered
        .into_iter()
        .map(|sv| {
            let ancestors: Vec<&Subvolume> = graph.ancestors(sv).collect();
            let mut planned = PlannedSend::new(sv);
            planned.parent = ancestors.first().copied();
            planned.clone_sources = ancestors;
            planned
        })
        .collect()
}
