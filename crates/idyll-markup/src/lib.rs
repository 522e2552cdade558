#![doc = r#"
⚠️ INTERNAL CRATE – NOT A STABLE API

Transcoder between the Idyll wire markup and the in-memory AST.

- `element`: a reader for the small XML-like subset the format uses
- `parse`: element tree -> `Document` / `AgentDocument` / `DiffDocument`
- `serialize`: the inverse, deterministic and stable under re-parsing

Parsing raises a typed `ParseError`; it never returns a partial AST.

Do NOT depend on this crate directly.
Use `idyll-io` instead.
"#]

pub mod element;
pub mod error;
pub mod options;
pub mod parse;
pub mod serialize;

pub use error::{ParseError, ParseErrorCode};
pub use options::ParseOptions;
pub use parse::{Parser, parse};
pub use serialize::{Serializer, XML_HEADER, serialize};
