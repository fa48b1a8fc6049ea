// error.rs — load-time error types
//
// Queries never fail; everything here is raised while a level is being
// decoded or assembled, and a failed load leaves no partial level behind.

use thiserror::Error;

/// A fixed-stride record lump could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LumpError {
    #[error("funny lump size ({lump}): {len} bytes is not a multiple of {stride}")]
    FunnySize {
        lump: &'static str,
        len: usize,
        stride: usize,
    },

    #[error("level has too many {lump}: {count} (limit {max})")]
    TooMany {
        lump: &'static str,
        count: usize,
        max: usize,
    },

    #[error("level has no {0}")]
    Missing(&'static str),
}

/// The visibility lump is malformed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VisError {
    #[error("visibility lump of {0} bytes is shorter than its cluster-count header")]
    Truncated(usize),

    #[error("visibility lump declares a negative cluster count ({0})")]
    BadClusterCount(i32),

    #[error("cluster offset table for {clusters} clusters overruns a {len}-byte visibility lump")]
    OffsetTableOverrun { clusters: usize, len: usize },

    #[error("visibility row for cluster {cluster} starts at {offset}, outside a {len}-byte lump")]
    RowOutOfRange {
        cluster: usize,
        offset: i32,
        len: usize,
    },

    #[error("visibility row for cluster {cluster} runs past the end of the lump")]
    RowTruncated { cluster: usize },

    #[error("visibility lump is {len} bytes (limit {max})")]
    TooLarge { len: usize, max: usize },
}

/// Cross-reference or structural failure while assembling a level.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error(transparent)]
    Lump(#[from] LumpError),

    #[error(transparent)]
    Vis(#[from] VisError),

    #[error("{what} {index} references plane {plane}, but the level has {count} planes")]
    BadPlane {
        what: &'static str,
        index: usize,
        plane: i64,
        count: usize,
    },

    #[error("brush {brush} uses sides {first}..{end}, but the level has {count} brush sides")]
    BadSideRange {
        brush: usize,
        first: i64,
        end: i64,
        count: usize,
    },

    #[error("leaf {leaf} uses leaf-brushes {first}..{end}, but the level has {count}")]
    BadLeafBrushRange {
        leaf: usize,
        first: usize,
        end: usize,
        count: usize,
    },

    #[error("leaf-brush entry {index} references brush {brush}, but the level has {count} brushes")]
    BadBrush {
        index: usize,
        brush: usize,
        count: usize,
    },

    #[error("node {node} has child {child}, outside {nodes} nodes / {leafs} leafs")]
    BadChild {
        node: usize,
        child: i32,
        nodes: usize,
        leafs: usize,
    },

    #[error("node {0} has more than one parent or lies on a cycle")]
    NodeCycle(usize),

    #[error("head node {0} is out of range")]
    BadHeadNode(i32),
}

/// Configuration could not be read or carries an unusable value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("gamma must be positive and finite, got {0}")]
    BadGamma(f32),
}
