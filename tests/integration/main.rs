//! End-to-end tests driving the engine facade.

mod helpers;

mod delivery_test;
mod dispatch_test;
mod limiter_test;
mod tracking_test;
