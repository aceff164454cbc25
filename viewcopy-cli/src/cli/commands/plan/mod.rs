//! `viewcopy plan`

mod handler;

pub use handler::handle_plan_command;
