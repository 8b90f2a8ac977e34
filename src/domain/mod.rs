pub mod clock;
pub mod firmware;
pub mod location;
pub mod models;
pub mod settings;
