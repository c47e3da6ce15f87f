pub mod credential;
pub mod session;
pub mod user;
