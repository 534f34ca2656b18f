// src/models/mod.rs

pub mod history;
pub mod question;
pub mod quiz;
pub mod round;
pub mod team;
pub mod user;
