//! Tests for the forkup-engine crate.

mod helpers;
