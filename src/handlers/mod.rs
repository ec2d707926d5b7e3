pub mod admin;
pub mod chat;
pub mod courses;
pub mod health;
pub mod payments;
pub mod users;
