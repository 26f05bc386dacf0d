pub mod error;
pub mod reconciler;

pub use error::ReconcileError;
pub use reconciler::Reconciler;
