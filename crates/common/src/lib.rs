// snapkeep-common: naming, identity, and protocol types shared across the workspace.

pub mod identity;
pub mod protocol;
pub mod refname;
pub mod types;
