//! Ancestry resolution against scheduler launch roots

use crate::tree::ProcessTree;
use gpuward_core::{AncestryEnd, AncestryHop, AncestryPath};
use std::collections::HashSet;
use tracing::trace;

/// Upper bound on hops in a single walk
///
/// A live tree can present parent cycles through PID reuse; the cap turns a
/// pathological walk into an unresolvable chain.
const MAX_DEPTH: usize = 256;

/// Resolves inventory PIDs to their nearest scheduler launch root
pub struct AncestryResolver<'a> {
    tree: &'a dyn ProcessTree,
}

impl<'a> AncestryResolver<'a> {
    /// Resolver over the given process tree
    pub fn new(tree: &'a dyn ProcessTree) -> Self {
        Self { tree }
    }

    /// Walk from `pid` toward PID 1, stopping at the first ancestor whose
    /// host PID or namespace-local PID is a member of `launch_roots`
    ///
    /// A chain that cannot be fully read (the process exited mid-walk) ends
    /// in [`AncestryEnd::Unresolvable`]; ambiguity never resolves upward to
    /// a launch root.
    pub fn resolve(&self, pid: u32, launch_roots: &HashSet<u32>) -> AncestryPath {
        let mut hops = Vec::new();
        let mut visited: HashSet<u32> = HashSet::new();
        let mut current = pid;

        loop {
            if hops.len() >= MAX_DEPTH || !visited.insert(current) {
                return AncestryPath {
                    hops,
                    end: AncestryEnd::Unresolvable(format!(
                        "walk from {} exceeded the depth limit",
                        pid
                    )),
                };
            }

            let ns_local = self.tree.ns_pid(current);

            // Schedulers may record a container root by its namespace-local
            // id, so membership is checked on both views of the PID.
            let matched = if launch_roots.contains(&current) {
                Some(current)
            } else {
                ns_local.filter(|p| launch_roots.contains(p))
            };

            if let Some(root) = matched {
                hops.push(AncestryHop {
                    pid: ns_local.unwrap_or(current),
                    host_pid: current,
                    parent_pid: self.tree.parent(current),
                });
                trace!(pid, root, "Ancestry matched launch root");
                return AncestryPath {
                    hops,
                    end: AncestryEnd::MatchedRoot(root),
                };
            }

            if current <= 1 {
                hops.push(AncestryHop {
                    pid: current,
                    host_pid: current,
                    parent_pid: Some(0),
                });
                return AncestryPath {
                    hops,
                    end: AncestryEnd::ReachedInit,
                };
            }

            match self.tree.parent(current) {
                Some(parent) => {
                    hops.push(AncestryHop {
                        pid: ns_local.unwrap_or(current),
                        host_pid: current,
                        parent_pid: Some(parent),
                    });
                    if parent == 0 {
                        return AncestryPath {
                            hops,
                            end: AncestryEnd::ReachedInit,
                        };
                    }
                    current = parent;
                }
                None => {
                    hops.push(AncestryHop {
                        pid: ns_local.unwrap_or(current),
                        host_pid: current,
                        parent_pid: None,
                    });
                    return AncestryPath {
                        hops,
                        end: AncestryEnd::Unresolvable(format!(
                            "parent of {} vanished mid-walk",
                            current
                        )),
                    };
                }
            }
        }
    }
}
