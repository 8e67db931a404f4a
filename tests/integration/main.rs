//! Integration tests for Follow-Harvester
//!
//! Cycles are driven through a scripted in-process page driver; one test
//! runs the Browserless driver against a wiremock render service.

mod crawl_tests;
mod discovery_tests;
mod support;
