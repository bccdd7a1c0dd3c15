//! Wire-level DTOs shared between the catalog sync backend and its clients.

pub mod domain;
pub mod shared;
pub mod usecases;
