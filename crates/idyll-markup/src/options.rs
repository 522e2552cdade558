/// Knobs for the markup parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail on unknown elements and unknown diff operations instead of
    /// skipping them.
    pub strict: bool,

    /// Maximum element nesting depth, root included.
    pub max_depth: usize,
}

impl ParseOptions {
    pub const DEFAULT_MAX_DEPTH: usize = 128;

    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}
