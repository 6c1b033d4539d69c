use clap::ValueEnum;

/// How the cell widths used to decode a node's `reg` are determined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeometryMode {
    /// The widths declared by the nearest ancestor that declares them.
    #[default]
    Scoped,
    /// The widths declared by the root node, for every node of the tree.
    Root,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub geometry: GeometryMode,
    /// Abort on cell decoding failures in optional tables instead of
    /// emitting them empty.
    pub strict: bool,
}
