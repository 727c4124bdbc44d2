//! Locate, launch and inspect the `dojo` binary from tests.

pub mod assertions;
pub mod executor;
pub mod layout;
pub mod process;

pub use assertions::{
    assert_clean_stderr, assert_no_warnings_or_errors, find_failure_marker, FailureMarker,
};
pub use executor::{decode_utf8, CommandRunner, LiveProcess};
pub use layout::ProjectLayout;
pub use process::ProcessConfig;
