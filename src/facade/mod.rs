pub mod admin;
pub mod downloads;
pub mod org;
pub mod records;

pub use admin::ResetSummary;
pub use downloads::{Download, is_binary_field};
pub use org::{MockOrg, OrgSettings};
pub use records::{SaveResult, UpsertOutcome, api_limits};
