mod request;
mod token;

pub use request::*;
pub use token::*;
