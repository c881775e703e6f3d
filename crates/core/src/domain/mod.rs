pub mod credential;
pub mod history;
pub mod job;
pub mod request;
