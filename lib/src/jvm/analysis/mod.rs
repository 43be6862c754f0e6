//! Control flow analysis of method bodies as they are written
//!
//! The method writer feeds every instruction to a [`ControlFlow`], which splits the code into
//! basic blocks and simulates each block on abstract [`Frame`]s. Once the body is complete, a
//! fixed point iteration over the blocks yields either just the maximum stack size or the full
//! input frame of every jump target, which [`stack_map`] then compresses into a stack map
//! attribute.

mod cfg;
mod frame;
mod label;
pub mod stack_map;
mod types;

pub use cfg::*;
pub use frame::*;
pub use label::*;
pub use types::FrameType;
