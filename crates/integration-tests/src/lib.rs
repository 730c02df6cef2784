//! Integration test harness for the navigation stack; see `tests/`.
