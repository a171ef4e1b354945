pub mod agency;
pub mod audit_log;
pub mod claim_request;
pub mod feature_flag;
mod lookup;
pub mod profile;
pub mod region;
pub mod trade;

pub use lookup::LookupMatch;
