mod common;
mod identity_tests;
