use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use idyll_core::traverse::walk;
use idyll_core::{Block, EditOperation};

use crate::apply::apply;
use crate::diagnostics::DiffError;

/// Machine-readable telemetry for one diff application.
///
/// Notes:
/// - Contains *no* wall-clock timestamps; only the elapsed time varies
///   between runs.
/// - Intended for operational monitoring, CI, and cost/complexity analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffTelemetry {
    /// Whether the diff applied cleanly.
    pub ok: bool,

    /// Elapsed time (milliseconds).
    pub elapsed_ms: u64,

    /// Operations total.
    pub ops: usize,

    /// Operations grouped by name (`insert`, `edit_attr`, ...).
    pub ops_by_type: BTreeMap<String, usize>,

    /// Unique block ids referenced by operations (targets, anchors, selections).
    pub target_blocks: usize,

    /// Blocks in the input tree, nested blocks included.
    pub input_blocks: usize,

    /// Blocks in the output tree (when applied).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_blocks: Option<usize>,

    /// Index of the failing operation (when failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_op_index: Option<usize>,

    /// Machine-readable error code (when failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl DiffTelemetry {
    pub fn op_counts(ops: &[EditOperation]) -> (usize, BTreeMap<String, usize>, usize) {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut targets: BTreeSet<&str> = BTreeSet::new();
        for o in ops {
            *by_type.entry(o.name().to_string()).or_insert(0) += 1;
            targets.extend(o.referenced_ids());
        }
        (ops.len(), by_type, targets.len())
    }
}

/// [`apply`], plus telemetry describing the run.
pub fn apply_with_telemetry(
    blocks: &[Block],
    operations: &[EditOperation],
) -> (Result<Vec<Block>, DiffError>, DiffTelemetry) {
    let started = Instant::now();
    let result = apply(blocks, operations);
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (ops, ops_by_type, target_blocks) = DiffTelemetry::op_counts(operations);
    let telemetry = DiffTelemetry {
        ok: result.is_ok(),
        elapsed_ms,
        ops,
        ops_by_type,
        target_blocks,
        input_blocks: walk(blocks).count(),
        output_blocks: result.as_ref().ok().map(|out| walk(out).count()),
        failed_op_index: result.as_ref().err().and_then(|e| e.op_index),
        error_code: result.as_ref().err().map(|e| e.code.as_str().to_string()),
    };
    (result, telemetry)
}
