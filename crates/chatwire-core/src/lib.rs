pub mod errors;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod store;
pub mod stream;
pub mod tools;
pub mod usage;
