use clap::ValueEnum;

/// How the local file name is derived from the URL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NamingPolicy {
    #[default]
    Plain,
    /// Prefix the name with the current Unix time in nanoseconds
    Timestamp,
}

/// What happens to the bytes left over when the size does not divide evenly.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RemainderPolicy {
    /// The last part absorbs the remainder
    #[default]
    LastPart,
    /// Every part has the same length and the trailing remainder is dropped
    Truncate,
}
