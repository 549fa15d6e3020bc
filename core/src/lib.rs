pub mod auth;
pub mod domains;
pub mod entries;
pub mod error;
pub mod factors;
pub mod insights;
pub mod oracle;
pub mod profile;
pub mod response;
pub mod snapshot;
