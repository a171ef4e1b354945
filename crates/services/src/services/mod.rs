pub mod agencies;
pub mod agency_validation;
pub mod audit;
pub mod auth;
pub mod bulk_import;
pub mod claims;
pub mod config;
pub mod database_validator;
pub mod email;
pub mod feature_flags;
pub mod notification;
pub mod users;
