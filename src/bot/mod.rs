pub mod command;
pub mod printer;

pub use command::Dispatcher;
pub use printer::{Author, Embed, Footer, Printer};
