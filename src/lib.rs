//! Finds regenerable clutter in well-known locations and moves it to the
//! trash, never deleting permanently.

pub mod aggregate;
pub mod analyzer;
pub mod catalog;
pub mod cleaner;
pub mod config;
pub mod disk;
pub mod dry_run;
pub mod engine;
pub mod history;
pub mod model;
pub mod notify;
pub mod paths;
pub mod scanner;
pub mod schedule;
pub mod selection;
pub mod store;
pub mod walk;

#[cfg(test)]
mod test_support;
