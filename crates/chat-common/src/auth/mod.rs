//! Authentication utilities

mod token;

pub use token::TokenAuth;
