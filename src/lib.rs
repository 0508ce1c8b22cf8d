//! Filtering and aggregation of VPR assessment results.
//!
//! Records are loaded once into a [`data::model::RecordStore`]; every change
//! of the [`data::filter::FilterState`] recomputes an
//! [`engine::DashboardView`] for the presentation layer.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod report;
pub mod state;
