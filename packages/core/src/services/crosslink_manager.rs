//! Crosslink cycle detection
//!
//! Crosslinks are checked purely on nuids. A crosslink `(parent, child)` lets a
//! walk continue from `parent` into `child` and then down the tree, so the guide
//! becomes circular when such walks can return to or above their start.
//!
//! The chain search is kept exactly as the guide editor has always run it,
//! including how the "found a connection" flag carries over from one chain start
//! to the next, because it decides which crosslinks existing guides accepted.

use crate::models::NuidPair;

pub struct CrosslinkManager;

impl CrosslinkManager {
    /// True if a single crosslink points at one of its own ancestors (or itself)
    pub fn check_crosslink(crosslink: &NuidPair) -> bool {
        let (parent, child) = crosslink;
        parent.starts_with(child.as_str())
    }

    /// True if the crosslink set makes the guide circular
    pub fn check_circularity(crosslinks: &[NuidPair]) -> bool {
        if crosslinks.iter().any(Self::check_crosslink) {
            return true;
        }

        let mut is_circular = false;
        let mut found_connection = true;

        for start in crosslinks {
            let mut chain: Vec<&NuidPair> = vec![start];

            while found_connection && !is_circular {
                for candidate in crosslinks {
                    let Some(tail) = chain.last() else {
                        break;
                    };
                    let chain_end = tail.1.as_str();
                    found_connection = false;

                    if !chain.iter().any(|link| *link == candidate)
                        && candidate.0.starts_with(chain_end)
                    {
                        chain.push(candidate);
                        found_connection = true;

                        let first_parent = chain[0].0.as_str();
                        let last_child = candidate.1.as_str();
                        if first_parent.starts_with(last_child) {
                            is_circular = true;
                        }
                    }
                }
            }

            if is_circular {
                break;
            }
        }

        if is_circular {
            tracing::warn!(crosslinks = crosslinks.len(), "Crosslink set is circular");
        }
        is_circular
    }
}
