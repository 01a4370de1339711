#![cfg(feature = "test-utils")]

mod buffered_test;
mod manager_test;
mod orchestrator_test;
