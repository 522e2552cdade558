#![doc = r#"
⚠️ INTERNAL CRATE – NOT A STABLE API

Diff engine for the Idyll document engine: applies an ordered list of edit
operations to a block tree.

Application is pure. The caller's tree is never touched; every run works on
its own copy and either returns the full result or a `DiffError` naming the
first operation that could not be applied.

Do NOT depend on this crate directly.
Use `idyll-io` instead.
"#]

pub mod apply;
pub mod diagnostics;
pub mod telemetry;

pub use apply::apply;
pub use diagnostics::{DiffError, DiffErrorCode};
pub use telemetry::{DiffTelemetry, apply_with_telemetry};
