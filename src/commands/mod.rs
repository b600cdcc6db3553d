pub mod probe;
pub mod reconcile;
pub mod run;

// Re-export command functions for convenience
pub use probe::probe;
pub use reconcile::reconcile;
pub use run::run;
