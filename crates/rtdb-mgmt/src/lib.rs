#![warn(missing_docs)]

//! Operator tooling for the realtime database client: CRUD, subtree deletion,
//! retention trimming

pub mod cli;
