pub mod google;
pub mod reconciliation;

pub use google::*;
pub use reconciliation::*;
