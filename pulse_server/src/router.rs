pub mod research;
pub mod sentiment;
