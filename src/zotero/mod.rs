pub mod client;
pub mod uri;
