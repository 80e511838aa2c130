// src/models/mod.rs

pub mod answer;
pub mod form;
pub mod identity;
pub mod submission;
