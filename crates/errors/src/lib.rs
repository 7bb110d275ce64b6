pub mod code;
pub mod kind;
pub mod labels;
pub mod model;
pub mod prelude;
pub mod render;
pub mod retry;
pub mod severity;
