pub mod access;
pub mod auth;
pub mod health;
pub mod leads;
pub mod users;
