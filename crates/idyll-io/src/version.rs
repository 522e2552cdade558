//! Format version constants.

/// Version of the Idyll markup vocabulary (document, agent and diff roots)
/// this crate reads and writes.
pub const FORMAT_VERSION: &str = "1.0";

/// The declaration every serialized document starts with.
pub const MARKUP_HEADER: &str = idyll_markup::XML_HEADER;
