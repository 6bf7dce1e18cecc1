pub mod codec;
pub mod error;
pub mod models;
pub mod profile;
pub mod rotation;
pub mod settings;
