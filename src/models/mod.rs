pub mod access;
pub mod lead;
pub mod user;
