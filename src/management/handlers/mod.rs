pub mod generation;
pub mod health;
pub mod pools;
pub mod rotation;
pub mod users;
