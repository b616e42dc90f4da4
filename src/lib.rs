//! Scrape Scheduler
//!
//! Durable scheduler for recurring scrape/crawl/map/batch jobs against a
//! remote scraping API, with a JSON management surface for creating,
//! editing, and manually triggering schedules.
//!
//! # Modules
//!
//! - [`config`]: application configuration, loaded from YAML.
//! - [`model`]: `ScheduledJob` / `JobRun` data model.
//! - [`recurrence`]: translates a `ScheduleType` + config into a cron
//!   expression and computes the next fire time in a given timezone.
//! - [`store`]: durable persistence (SQLite).
//! - [`runner`]: executes a job against the remote scraping API.
//! - [`scheduler`]: process-wide scheduling and the single run procedure
//!   shared by cron ticks and manual triggers.
//! - [`web`]: the management HTTP API.

pub mod config;
pub mod error;
pub mod model;
pub mod recurrence;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod web;

pub use error::{Error, Result};
