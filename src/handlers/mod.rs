// src/handlers/mod.rs

pub mod form;
pub mod response;
