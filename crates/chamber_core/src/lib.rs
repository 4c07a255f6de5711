pub mod resource;
pub mod time;
