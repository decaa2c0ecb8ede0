// Backup core: the per-cycle algorithm and snapshot retrieval.

pub mod cycle;
pub mod restore;

pub use cycle::{
    current_identity, load_config_or_default, locate, log_cycle_result, run_cycle, CycleDeps,
    CycleError, CycleOutcome, Target,
};
pub use restore::{
    inspect, list_all, list_backups, restore, Inspection, RestoreError, RestoreMethod,
};
