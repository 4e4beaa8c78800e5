pub mod concept;
pub mod config;
pub mod log_buffer;
pub mod time_constraint;
pub mod url_state;
pub mod view_state;
