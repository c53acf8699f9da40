//! HTTP handlers

pub mod health;
pub mod models;
pub mod safety;
pub mod config;
pub mod features;

#[cfg(test)]
mod tests;
