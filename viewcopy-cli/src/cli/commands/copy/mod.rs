//! `viewcopy copy`

mod handler;

pub use handler::handle_copy_command;
