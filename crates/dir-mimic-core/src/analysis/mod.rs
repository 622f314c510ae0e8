pub mod identity;
pub mod reconcile;
