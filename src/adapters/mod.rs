pub mod api;
pub mod db;
pub mod history_file;
