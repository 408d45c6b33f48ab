use std::fmt;

/// Visibility of a function across module boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// Defined here and callable from other modules.
    Public,

    /// Defined here, local to this module.
    Private,

    /// Declared here, defined elsewhere.
    External,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::External => "external",
        };
        write!(f, "{s}")
    }
}
