// src/dag/staleness.rs

//! Up-to-date checks for a single node, based on file timestamps.
//!
//! Two independent predicates:
//! - [`is_done`]: every declared output exists.
//! - [`is_outdated`]: some input is strictly newer than the oldest output.
//!
//! Both only look at the node's own files; sub-nodes are never consulted.

use std::time::SystemTime;

use crate::errors::Result;
use crate::fs::FileStatusCache;
use crate::node::Node;

/// True iff every declared output file exists.
///
/// A node without outputs is always done. Nodes that need "has run at least
/// once" semantics must declare a marker output.
pub fn is_done(node: &Node, cache: &mut FileStatusCache) -> Result<bool> {
    for path in node.output_files() {
        if !cache.stat(path)?.exists() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True iff the node has inputs and outputs, all outputs exist, and at least
/// one input was modified strictly after the oldest output.
///
/// Equal timestamps count as up to date. Missing inputs are ignored here;
/// they are either produced upstream or rejected when the graph is built.
pub fn is_outdated(node: &Node, cache: &mut FileStatusCache) -> Result<bool> {
    if node.input_files().is_empty() || node.output_files().is_empty() {
        return Ok(false);
    }

    let mut oldest_output: Option<SystemTime> = None;
    for path in node.output_files() {
        match cache.stat(path)?.mtime() {
            Some(mtime) => {
                oldest_output = Some(oldest_output.map_or(mtime, |cur| cur.min(mtime)));
            }
            None => return Ok(false),
        }
    }
    let Some(oldest_output) = oldest_output else {
        return Ok(false);
    };

    for path in node.input_files() {
        if let Some(mtime) = cache.stat(path)?.mtime() {
            if mtime > oldest_output {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Both predicates for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    pub done: bool,
    pub outdated: bool,
}

/// Evaluate a node against the cache.
///
/// Auxiliary files are stat'ed as well, so an unreadable path fails every
/// node that depends on it, not only the ones whose outputs already exist.
pub fn evaluate(node: &Node, cache: &mut FileStatusCache) -> Result<Staleness> {
    for path in node.input_files().iter().chain(node.auxiliary_files()) {
        cache.stat(path)?;
    }

    Ok(Staleness {
        done: is_done(node, cache)?,
        outdated: is_outdated(node, cache)?,
    })
}
