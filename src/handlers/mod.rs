// src/handlers/mod.rs

pub mod auth;
pub mod player;
pub mod question;
pub mod quiz;
pub mod round;
pub mod submission;
pub mod team;
