pub mod constants;
mod settle;
mod wait_for_element;

pub use settle::settle;
pub use wait_for_element::wait_for_element;
