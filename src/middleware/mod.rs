pub mod auth;

pub use auth::AuthenticatedOrganizer;
