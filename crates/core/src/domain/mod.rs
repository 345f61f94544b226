pub mod payload;
pub mod request;
pub mod role;
