pub mod code;
#[allow(clippy::module_inception)]
pub mod compiler;
pub mod frame;
pub mod symbol_table;
pub mod vm;
