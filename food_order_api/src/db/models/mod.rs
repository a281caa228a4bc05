pub mod orders;
pub mod products;
pub mod tasks;
pub mod users;
