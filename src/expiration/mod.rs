mod pruner;

pub use pruner::{prune_expired, start_retention_pruner};
