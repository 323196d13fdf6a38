pub mod message;
pub mod session;
pub mod skill;
pub mod user;
