#![doc = include_str!("../README.md")]

mod allocator;
mod creator;
mod driver;
mod error;
mod number;
mod store;
mod time;
mod verify;

pub use crate::allocator::*;
pub use crate::creator::*;
pub use crate::driver::*;
pub use crate::error::*;
pub use crate::number::*;
pub use crate::store::*;
pub use crate::time::*;
pub use crate::verify::*;
