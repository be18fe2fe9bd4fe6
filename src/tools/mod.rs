pub mod read_output;
pub mod send_input;
pub mod start_program;
pub mod stop_session;
