//! Panel services: sender name resolution and live subscriptions.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the async work (store I/O, task lifecycles) so the
//! panel and its state modules stay synchronous and easy to test.

pub mod names;
pub mod subscription;
