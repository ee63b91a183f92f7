//! Small shared helpers: input validation and durable file IO.

pub mod io;
pub mod validation;
