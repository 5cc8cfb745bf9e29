/*
[INPUT]:  Auth backend contract and domain definitions
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for the auth core
[UPDATE]: When the domain model or wire schema changes
*/

pub mod enums;
pub mod models;
pub mod requests;
pub mod responses;

pub use enums::*;
pub use models::*;
pub use requests::*;
pub use responses::*;
