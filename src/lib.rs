pub mod archive;
pub mod dataset;
pub mod error;
pub mod factory;
pub mod output;
pub mod progress;
pub mod provider;
pub mod providers;
pub mod settings;
pub mod store;
pub mod version;
